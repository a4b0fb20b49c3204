use std::sync::Arc;

use super::TopicKey;

/// Доставленное подписчику сообщение.
///
/// Payload разделяется между всеми подписчиками одной публикации через `Arc`
/// и не копируется при fan-out.
#[derive(Debug)]
pub struct Message<P> {
    /// Топик, на который было опубликовано сообщение.
    pub topic: TopicKey,
    /// Номер публикации в пределах диспетчера (монотонно растёт).
    pub sequence: u64,
    pub payload: Arc<P>,
}

impl<P> Message<P> {
    pub fn new(
        topic: TopicKey,
        sequence: u64,
        payload: Arc<P>,
    ) -> Self {
        Self {
            topic,
            sequence,
            payload,
        }
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }
}

// Ручная реализация: derive потребовал бы `P: Clone`.
impl<P> Clone for Message<P> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            sequence: self.sequence,
            payload: Arc::clone(&self.payload),
        }
    }
}

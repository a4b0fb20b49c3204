//! Демонстрация шины событий.
//!
//! Несколько симуляций публикуют события жизненного цикла через фасад, а
//! подписчики (наблюдатель прогресса на каждую симуляцию и глобальный
//! наблюдатель завершений, отфильтрованный по делу) читают их параллельно.
//! В конце печатается статистика диспетчера в JSON.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use reconbus::{
    build_info, init_logging,
    pubsub::{EntityKind, EntityMatchesVariable, ReconEvent, SimulationEvent},
    Dispatcher, EventName, EventPublisher, ReconbusResult, RecvError, Settings, StatusCode,
    Subscription, SubscriptionId, SubscriptionOptions,
};
use reconbus_error::{bail, context, ensure};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Аргументы командной строки.
#[derive(Parser, Debug)]
#[command(name = "reconbus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Topic-based event distribution demo", long_about = None)]
struct Cli {
    /// Путь к TOML-файлу настроек
    #[arg(short, long, env = "RECONBUS_CONFIG")]
    config: Option<PathBuf>,
    /// Количество параллельных симуляций
    #[arg(short, long, default_value_t = 4)]
    simulations: usize,
    /// Шагов прогресса на симуляцию
    #[arg(long, default_value_t = 10)]
    steps: u8,
    /// Дело, завершения которого отслеживает глобальный наблюдатель
    #[arg(long, default_value = "case-0")]
    watch_case: String,
    /// Переопределить уровень логирования
    #[arg(short, long)]
    log_level: Option<String>,
}

/// Итог одного наблюдателя.
#[derive(Debug, Serialize)]
struct WatcherSummary {
    name: String,
    received: u64,
    lagged: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    check_args(&cli).context("Invalid arguments")?;

    let mut settings =
        Settings::load_from(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(level) = cli.log_level.clone() {
        settings.logging.level = level;
    }
    let logging = init_logging(&settings.logging).context("Failed to initialize logging")?;

    info!(
        version = build_info::VERSION,
        git_commit = build_info::GIT_COMMIT,
        build_time = build_info::BUILD_TIME,
        default_capacity = settings.pubsub.default_capacity,
        "reconbus demo starting"
    );

    let dispatcher: Dispatcher<ReconEvent> = Dispatcher::new(settings.pubsub.into());
    let publisher = EventPublisher::new(dispatcher.clone());

    let sim_ids: Vec<String> = (0..cli.simulations).map(|i| format!("sim-{i}")).collect();
    let watchers = open_watchers(&publisher, &sim_ids, &cli.watch_case)?;
    let ids: Vec<SubscriptionId> = watchers.iter().map(|(_, sub)| sub.id()).collect();
    let consumers: Vec<JoinHandle<WatcherSummary>> = watchers
        .into_iter()
        .map(|(name, sub)| tokio::spawn(consume(name, sub)))
        .collect();

    let runners: Vec<JoinHandle<()>> = sim_ids
        .iter()
        .enumerate()
        .map(|(i, sim_id)| {
            let publisher = publisher.clone();
            let event = SimulationEvent::new(sim_id.clone(), format!("case-{}", i % 2));
            tokio::spawn(run_simulation(publisher, event, cli.steps))
        })
        .collect();

    for runner in runners {
        runner.await.context("simulation runner panicked")?;
    }

    // Все события опубликованы: отменяем подписки, наблюдатели дочитывают
    // буферы и завершаются.
    for id in ids {
        dispatcher.cancel(id);
    }
    let mut summaries = Vec::new();
    for consumer in consumers {
        summaries.push(consumer.await.context("watcher panicked")?);
    }

    let report = serde_json::json!({
        "stats": dispatcher.stats(),
        "watchers": summaries,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    logging.shutdown();
    Ok(())
}

/// Проверяет аргументы демонстрации.
fn check_args(cli: &Cli) -> ReconbusResult<()> {
    ensure!(
        cli.simulations > 0,
        StatusCode::InvalidArgs,
        "--simulations must be at least 1"
    );
    if cli.watch_case.trim().is_empty() {
        bail!(StatusCode::InvalidArgs, "--watch-case must not be empty");
    }
    Ok(())
}

/// Открывает наблюдателя прогресса на каждую симуляцию и один глобальный
/// наблюдатель завершений для дела `watch_case`.
fn open_watchers(
    publisher: &EventPublisher<ReconEvent>,
    sim_ids: &[String],
    watch_case: &str,
) -> ReconbusResult<Vec<(String, Subscription<ReconEvent>)>> {
    let mut watchers = Vec::with_capacity(sim_ids.len() + 1);
    for sim_id in sim_ids {
        let sub = context!(
            publisher.subscribe_scoped(
                EventName::SimulationProgress,
                sim_id,
                SubscriptionOptions::new(),
            ),
            "progress watcher for {}",
            sim_id
        )?;
        watchers.push((format!("progress:{sim_id}"), sub));
    }

    let completions = context!(
        publisher.subscribe_global(
            EventName::SimulationCompleted,
            SubscriptionOptions::new()
                .variable("caseId", watch_case)
                .filter(EntityMatchesVariable::new(EntityKind::Case, "caseId")),
        ),
        "completion watcher"
    )?;
    watchers.push((format!("completed:{watch_case}"), completions));

    Ok(watchers)
}

async fn run_simulation(
    publisher: EventPublisher<ReconEvent>,
    event: SimulationEvent,
    steps: u8,
) {
    publisher.publish_event(
        EventName::SimulationStarted,
        ReconEvent::Simulation(event.clone()),
    );

    let steps = steps.max(1);
    for step in 1..=steps {
        let percent = (u16::from(step) * 100 / u16::from(steps)) as u8;
        publisher.publish_event(
            EventName::SimulationProgress,
            ReconEvent::Simulation(event.running(percent)),
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let report = publisher.publish_event(
        EventName::SimulationCompleted,
        ReconEvent::Simulation(event.completed()),
    );
    info!(
        simulation_id = %event.simulation_id,
        delivered = report.delivered(),
        "simulation completed"
    );
}

async fn consume(
    name: String,
    sub: Subscription<ReconEvent>,
) -> WatcherSummary {
    let mut summary = WatcherSummary {
        name,
        received: 0,
        lagged: 0,
    };
    let mut stream = Box::pin(sub.into_stream());
    while let Some(item) = stream.next().await {
        match item {
            Ok(_) => summary.received += 1,
            Err(RecvError::Lagged { count }) => {
                warn!(watcher = %summary.name, count, "watcher lagged");
                summary.lagged += count;
            }
            Err(RecvError::Closed) => break,
        }
    }
    summary
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("reconbus").chain(args.iter().copied())).unwrap()
    }

    /// Тест проверяет, что аргументы по умолчанию проходят проверку.
    #[test]
    fn test_default_args_are_valid() {
        assert!(check_args(&parse(&[])).is_ok());
    }

    /// Тест проверяет отказ на нулевом числе симуляций и пустом деле.
    #[test]
    fn test_invalid_args_rejected() {
        let err = check_args(&parse(&["--simulations", "0"])).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgs);
        assert!(err.to_string().contains("--simulations"));

        let err = check_args(&parse(&["--watch-case", " "])).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgs);
        assert!(err.to_string().contains("--watch-case"));
    }

    /// Тест проверяет, что наблюдатели открываются на каждую симуляцию и
    /// один на завершения.
    #[test]
    fn test_open_watchers() {
        let publisher: EventPublisher<ReconEvent> = EventPublisher::new(Dispatcher::default());
        let sims = vec!["sim-0".to_string(), "sim-1".to_string()];

        let watchers = open_watchers(&publisher, &sims, "case-0").unwrap();
        let names: Vec<&str> = watchers.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["progress:sim-0", "progress:sim-1", "completed:case-0"]);
        assert_eq!(publisher.dispatcher().subscription_count(), 3);
    }
}

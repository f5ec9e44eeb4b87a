use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relayvisor::{
    ChannelDefinition, LogWriter, NatsBus, Settings, Sink, Subscribe, Supervisor, TelegramSink,
};

fn init_logging(is_dev: bool) {
    let default = if is_dev { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(is_dev)
        .with_ansi(is_dev)
        .init();
    info!(
        event_code = 0,
        "Logger initialized ({} Mode)",
        if is_dev { "Dev" } else { "Production" }
    );
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let settings = Settings::from_env();
    init_logging(settings.as_ref().is_ok_and(|s| s.is_dev));

    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            error!(event_code = -1, label = e.as_label(), "{e}");
            return ExitCode::FAILURE;
        }
    };

    let bus = match NatsBus::connect(&settings.nats_url, settings.nats_credentials.clone()).await {
        Ok(bus) => bus,
        Err(e) => {
            error!(event_code = -1, label = e.as_label(), "{e}");
            return ExitCode::FAILURE;
        }
    };
    info!(event_code = 0, url = %settings.nats_url, "connected to message bus");

    let sink = match TelegramSink::new(&settings.telegram_api, &settings.bot_token) {
        Ok(sink) => sink,
        Err(e) => {
            error!(event_code = -1, label = e.as_label(), "{e}");
            return ExitCode::FAILURE;
        }
    };
    info!(event_code = 0, sink = sink.name(), "notification sink ready");

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let sup = Supervisor::builder(settings.runtime.clone(), Arc::new(bus), Arc::new(sink))
        .with_subscribers(subs)
        .build();
    let channels = vec![
        ChannelDefinition::alerts(settings.chat_id_alerts.clone()),
        ChannelDefinition::engine(settings.chat_id_engine.clone()),
    ];

    match sup.run(channels).await {
        Ok(()) => {
            info!(event_code = 0, "relay stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(event_code = -1, label = e.as_label(), "{e}");
            ExitCode::FAILURE
        }
    }
}

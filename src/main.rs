// Guard dispatch driver
//
// Keep-running stand-in for the mobile foreground service: reads location
// samples and guard intents from stdin, one per line, and prints session
// events. Configured from GUARD_DISPATCH_* environment variables.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use guard_dispatch::api::{DispatchApi, UnconfiguredApi};
use guard_dispatch::store::{CredentialStore, JsonFileStore, MemoryCredentialStore};
use guard_dispatch::{
    DispatchEngine, EngineOptions, GuardId, LocationSample, LoginGrant, WebSocketTransport,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const USAGE: &str = "\
commands:
  login <guardId> <accessToken> [refreshToken]
  start <lat>,<lng>
  <lat>,<lng>            periodic location sample
  accept | reject        decide on the pending report
  arrive | finish | cancel | support
  toggle                 go on or off patrol
  ack                    acknowledge the not-responding warning
  status                 print the session snapshot
  stop | logout | quit";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let options = EngineOptions::from_env().context("loading options")?;
    let store: Arc<dyn CredentialStore> = match &options.store_path {
        Some(path) => Arc::new(JsonFileStore::open(path).context("opening credential store")?),
        None => Arc::new(MemoryCredentialStore::new()),
    };
    let api = build_api(&options, &store)?;
    let engine = DispatchEngine::new(options, WebSocketTransport::new(), api, store);

    let mut events = engine.session().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("event: {event:?}");
        }
    });

    println!("{USAGE}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match run_command(&engine, line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("error: {e:#}"),
        }
    }

    engine.stop().await.ok();
    engine.shutdown();
    Ok(())
}

#[cfg(feature = "http")]
fn build_api(
    options: &EngineOptions,
    store: &Arc<dyn CredentialStore>,
) -> Result<Arc<dyn DispatchApi>> {
    match &options.api_url {
        Some(url) => Ok(Arc::new(guard_dispatch::api::HttpDispatchApi::new(
            url.clone(),
            Arc::clone(store),
            options.request_timeout,
        )?)),
        None => Ok(Arc::new(UnconfiguredApi)),
    }
}

#[cfg(not(feature = "http"))]
fn build_api(
    options: &EngineOptions,
    _store: &Arc<dyn CredentialStore>,
) -> Result<Arc<dyn DispatchApi>> {
    if options.api_url.is_some() {
        log::warn!("REST URL configured but built without the `http` feature");
    }
    Ok(Arc::new(UnconfiguredApi))
}

/// Run one stdin command; `false` ends the loop
async fn run_command(engine: &DispatchEngine, line: &str) -> Result<bool> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(true);
    };
    let session = engine.session();

    match command {
        "login" => {
            let guard_id: i64 = words
                .next()
                .ok_or_else(|| anyhow!("missing guard id"))?
                .parse()?;
            let access = words.next().ok_or_else(|| anyhow!("missing access token"))?;
            let refresh = words.next().map(str::to_string);
            engine
                .login(LoginGrant::new(GuardId::new(guard_id), access, refresh))
                .await?;
            println!("logged in as guard {guard_id}");
        }
        "start" => {
            let sample = parse_sample(words.next().unwrap_or_default())?;
            engine.start(sample).await?;
        }
        "accept" => println!("{:?}", session.confirm_intervention().await?),
        "reject" => println!("{:?}", session.reject_intervention().await?),
        "arrive" => println!("arrival sent for {}", session.confirm_arrival().await?),
        "finish" => println!("finished {}", session.finish_intervention().await?),
        "cancel" => println!("abandoned {}", session.cancel_started_intervention().await?),
        "support" => println!("support requested for {}", session.call_for_support().await?),
        "toggle" => println!("status {}", session.toggle_patrol().await?),
        "ack" => session.acknowledge_warning().await?,
        "status" => {
            println!("{:?}", session.snapshot());
            println!("{:?}", engine.connection().status());
        }
        "stop" => engine.stop().await?,
        "logout" => engine.logout().await?,
        "quit" | "exit" => return Ok(false),
        _ if command.contains(',') => {
            let outcome = engine.on_location(parse_sample(command)?).await;
            log::debug!("tick: {:?}", outcome.report);
        }
        other => bail!("unknown command `{other}`\n{USAGE}"),
    }
    Ok(true)
}

fn parse_sample(text: &str) -> Result<LocationSample> {
    let (lat, lng) = text
        .split_once(',')
        .ok_or_else(|| anyhow!("expected <lat>,<lng>, got `{text}`"))?;
    Ok(LocationSample::new(lat.trim().parse()?, lng.trim().parse()?))
}

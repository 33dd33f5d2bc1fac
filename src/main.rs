use medalboard::{
    admin_router,
    awards::start_recalculation_task,
    source::{LogNotificationSink, NotificationSink, StaticTownDirectory, TownStatSource},
    stats::StatResolver,
    storage::FileAwardStore,
    sync::{RemoteStore, RestRemoteStore, SyncConfig},
    AppState, AwardService, MedalboardConfig, StatSource, SyncGateway, WorldStatsSource,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medalboard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("medalboard.toml"));
    let config = MedalboardConfig::load(&config_path).await?;

    info!(
        config = %config_path.display(),
        metrics = config.metrics.len(),
        sync_enabled = config.sync.enabled,
        "Starting medalboard"
    );

    let mut worlds = WorldStatsSource::new(config.sources.worlds.clone());
    if let Some(user_cache) = &config.sources.user_cache {
        worlds = worlds.with_user_cache(user_cache);
    }
    let players: Arc<dyn StatSource> = Arc::new(worlds);
    let notifier: Arc<dyn NotificationSink> = Arc::new(LogNotificationSink);

    let player_awards = build_service(
        &config,
        players.clone(),
        &config.storage.root,
        &config.sync,
        notifier.clone(),
    )?;
    let mut app = admin_router(AppState::new(player_awards.clone()));
    let mut services = vec![player_awards];

    if config.sources.towns.enabled() {
        let directory = Arc::new(StaticTownDirectory::new(
            config.sources.towns.members.clone(),
        ));
        let towns: Arc<dyn StatSource> = Arc::new(TownStatSource::new(players, directory));
        let town_awards = build_service(
            &config,
            towns,
            &config.sources.towns.root,
            &config.town_sync(),
            notifier,
        )?;
        app = app.nest("/towns", admin_router(AppState::new(town_awards.clone())));
        services.push(town_awards);
    }

    for service in &services {
        if let Err(err) = service.restore().await {
            warn!(error = %err, "Could not restore award records, starting empty");
        }
        if config.schedule.enabled() {
            tokio::spawn(start_recalculation_task(
                service.clone(),
                config.schedule.recalculation(),
            ));
        }
    }

    let app = app.layer(TraceLayer::new_for_http());

    let address = config.bind_address()?;
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Admin API listening on http://{}", address);
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_service(
    config: &MedalboardConfig,
    source: Arc<dyn StatSource>,
    store_root: &Path,
    sync: &SyncConfig,
    notifier: Arc<dyn NotificationSink>,
) -> Result<Arc<AwardService>, Box<dyn std::error::Error>> {
    let mut builder = AwardService::builder(source, Arc::new(FileAwardStore::new(store_root)))
        .with_metrics(config.metrics.clone())
        .with_point_table(config.points.clone())
        .with_resolver(StatResolver::with_namespace(&config.sources.namespace))
        .with_notifier(notifier);

    if sync.enabled {
        let remote: Arc<dyn RemoteStore> = Arc::new(RestRemoteStore::new(sync)?);
        builder = builder.with_sync(SyncGateway::spawn(remote, sync.clone()));
    }

    Ok(Arc::new(builder.build()))
}

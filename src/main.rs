use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};
use mars_journal::events::EventBus;
use mars_journal::services::{
    CounterService, FeedProjector, MailTransport, MediaValidator, NotificationDispatcher,
    ObjectStore, PostService, S3ObjectStore, SmtpMailer, SubscriberService,
};
use mars_journal::{handlers, metrics, middleware, Config};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::io;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn health_summary(pool: web::Data<PgPool>) -> HttpResponse {
    match sqlx::query("SELECT 1").fetch_one(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "mars-journal",
            "version": env!("CARGO_PKG_VERSION")
        })),
        Err(e) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "unhealthy",
            "error": format!("PostgreSQL connection failed: {}", e),
            "service": "mars-journal"
        })),
    }
}

async fn liveness_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "alive" }))
}

async fn readiness_check(pool: web::Data<PgPool>) -> HttpResponse {
    match sqlx::query("SELECT 1").fetch_one(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "ready": true })),
        Err(e) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "ready": false,
            "error": format!("PostgreSQL connection failed: {}", e)
        })),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}

/// Container healthcheck subcommand: probe the local health endpoint.
async fn run_healthcheck(port: u16) -> io::Result<()> {
    let url = format!("http://127.0.0.1:{}/api/v1/health", port);
    match reqwest::Client::new().get(&url).send().await {
        Ok(resp) if resp.status().is_success() => Ok(()),
        Ok(resp) => {
            eprintln!("healthcheck HTTP status: {}", resp.status());
            Err(io::Error::new(io::ErrorKind::Other, "healthcheck failed"))
        }
        Err(e) => {
            eprintln!("healthcheck HTTP error: {}", e);
            Err(io::Error::new(io::ErrorKind::Other, "healthcheck error"))
        }
    }
}

/// Operator subcommand: hash a password for ADMIN_PASSWORD_HASH.
fn run_hash_password(password: Option<String>) -> io::Result<()> {
    let password = match password {
        Some(p) => p,
        None => {
            eprintln!("usage: mars-journal hash-password <password>");
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "missing password"));
        }
    };

    match mars_journal::auth::hash_password(&password) {
        Ok(hash) => {
            println!("{}", hash);
            Ok(())
        }
        Err(e) => {
            eprintln!("hashing failed: {}", e);
            Err(io::Error::new(io::ErrorKind::Other, "hashing failed"))
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    {
        let mut args = std::env::args();
        let _bin = args.next();
        if let Some(cmd) = args.next() {
            match cmd.as_str() {
                "healthcheck" => {
                    let port = std::env::var("JOURNAL_PORT")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(8080);
                    return run_healthcheck(port).await;
                }
                "hash-password" => return run_hash_password(args.next()),
                other => {
                    eprintln!("unknown subcommand: {}", other);
                    return Err(io::Error::new(io::ErrorKind::InvalidInput, "unknown subcommand"));
                }
            }
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting mars-journal v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    let pool = match PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database pool creation failed: {:#}", e);
            eprintln!("ERROR: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("migrations failed: {}", e)))?;

    tracing::info!("Database connected, migrations applied");

    let store: Option<Arc<dyn ObjectStore>> = match &config.storage {
        Some(storage_config) => match S3ObjectStore::connect(storage_config).await {
            Ok(store) => {
                tracing::info!(bucket = %storage_config.bucket, "object storage configured");
                Some(Arc::new(store))
            }
            Err(e) => {
                tracing::error!("Object storage initialization failed: {}", e);
                eprintln!("ERROR: Failed to initialize object storage: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("object storage not configured, media probes disabled");
            None
        }
    };

    let transport: Option<Arc<dyn MailTransport>> = match &config.smtp {
        Some(smtp_config) => match SmtpMailer::new(smtp_config) {
            Ok(mailer) => {
                tracing::info!(host = %smtp_config.host, "SMTP transport configured");
                Some(Arc::new(mailer))
            }
            Err(e) => {
                tracing::error!("SMTP transport initialization failed: {}", e);
                eprintln!("ERROR: Failed to initialize SMTP transport: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("SMTP not configured, notification batches will skip recipients");
            None
        }
    };

    let events = EventBus::new(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let validator = Arc::new(MediaValidator::new(store));
    let post_service = PostService::new(
        pool.clone(),
        events.clone(),
        validator.clone(),
        config.publish.clone(),
    );
    let counter_service = CounterService::new(pool.clone());
    let subscriber_service = SubscriberService::new(pool.clone());
    let feed_projector = FeedProjector::new(pool.clone(), config.site.clone());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        pool.clone(),
        transport,
        config.site.clone(),
        events.clone(),
        shutdown_tx.clone(),
    ));

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("Starting HTTP server at {}", bind_address);

    let config_data = web::Data::new(config.clone());
    let pool_data = web::Data::new(pool.clone());
    let post_service_data = web::Data::new(post_service);
    let counter_service_data = web::Data::new(counter_service);
    let subscriber_service_data = web::Data::new(subscriber_service);
    let feed_projector_data = web::Data::new(feed_projector);
    let dispatcher_data = web::Data::new(dispatcher.clone());
    let validator_data = web::Data::new(validator.clone());

    let cors_origins = config.cors.allowed_origins.clone();

    let server = HttpServer::new(move || {
        let mut cors = Cors::default();
        for origin in cors_origins.split(',') {
            let origin = origin.trim();
            if origin == "*" {
                cors = cors.allow_any_origin();
            } else {
                cors = cors.allowed_origin(origin);
            }
        }
        cors = cors.allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(config_data.clone())
            .app_data(pool_data.clone())
            .app_data(post_service_data.clone())
            .app_data(counter_service_data.clone())
            .app_data(subscriber_service_data.clone())
            .app_data(feed_projector_data.clone())
            .app_data(dispatcher_data.clone())
            .app_data(validator_data.clone())
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .route("/rss.xml", web::get().to(handlers::get_rss))
            .route("/api/v1/health", web::get().to(health_summary))
            .route("/api/v1/health/live", web::get().to(liveness_check))
            .route("/api/v1/health/ready", web::get().to(readiness_check))
            .service(
                web::scope("/api/v1")
                    .route("/posts", web::get().to(handlers::get_recent))
                    .route("/posts/{slug}", web::get().to(handlers::get_published_post))
                    .route("/posts/{slug}/like", web::post().to(handlers::like_post))
                    .route("/archive", web::get().to(handlers::get_archive))
                    .route("/search", web::get().to(handlers::search_posts))
                    .route("/stats", web::get().to(handlers::get_stats))
                    .route("/subscribe", web::post().to(handlers::subscribe))
                    .route("/unsubscribe", web::post().to(handlers::unsubscribe))
                    // Login sits under /admin in the URL space but outside
                    // the token guard; registration order wins the match.
                    .route("/admin/login", web::post().to(handlers::login))
                    .service(
                        web::scope("/admin")
                            .wrap(middleware::AdminAuthMiddleware)
                            .service(
                                web::scope("/posts")
                                    .service(
                                        web::resource("")
                                            .route(web::post().to(handlers::create_post))
                                            .route(web::get().to(handlers::list_posts)),
                                    )
                                    .service(
                                        web::resource("/{post_id}")
                                            .route(web::get().to(handlers::get_post))
                                            .route(web::patch().to(handlers::update_post))
                                            .route(web::delete().to(handlers::delete_post)),
                                    )
                                    .route(
                                        "/{post_id}/publish",
                                        web::post().to(handlers::publish_post),
                                    )
                                    .route(
                                        "/{post_id}/unpublish",
                                        web::post().to(handlers::unpublish_post),
                                    )
                                    .route(
                                        "/{post_id}/batches",
                                        web::get().to(handlers::list_post_batches),
                                    ),
                            )
                            .route("/subscribers", web::get().to(handlers::list_subscribers))
                            .route(
                                "/batches/{batch_id}",
                                web::get().to(handlers::get_batch_summary),
                            )
                            .route(
                                "/batches/{batch_id}/recipients",
                                web::get().to(handlers::list_batch_recipients),
                            )
                            .route(
                                "/batches/{batch_id}/redispatch",
                                web::post().to(handlers::redispatch_batch),
                            )
                            .route("/media/presign", web::post().to(handlers::presign_upload)),
                    ),
            )
    })
    .bind(&bind_address)?
    .workers(4)
    .run();

    let server_handle = server.handle();

    let mut tasks: JoinSet<io::Result<()>> = JoinSet::new();

    tasks.spawn(async move {
        tracing::info!("HTTP server is running");
        server.await
    });

    let worker = dispatcher.clone();
    tasks.spawn(async move {
        worker.run().await;
        Ok(())
    });

    let mut first_error: Option<io::Error> = None;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = tasks.join_next() => {
                match result {
                    Some(Ok(Ok(_))) => {
                        tracing::info!("Background task completed");
                    }
                    Some(Ok(Err(e))) => {
                        tracing::error!("Task returned error: {}", e);
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                        let _ = shutdown_tx.send(());
                        server_handle.stop(true).await;
                        tasks.shutdown().await;
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::error!("Task join error: {}", e);
                        if first_error.is_none() {
                            first_error = Some(io::Error::new(io::ErrorKind::Other, e.to_string()));
                        }
                        let _ = shutdown_tx.send(());
                        server_handle.stop(true).await;
                        tasks.shutdown().await;
                        break;
                    }
                    None => break,
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                let _ = shutdown_tx.send(());
                server_handle.stop(true).await;
                tasks.shutdown().await;
                break;
            }
        }
    }

    tracing::info!("mars-journal shutting down");

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

use crate::config::Config;
use crate::controller::UploadController;
use crate::inference_client::HttpDetectorFactory;
use crate::server::HttpServer;

use std::error::Error;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let factory = match HttpDetectorFactory::new(&config.detector) {
        Ok(factory) => factory,
        Err(e) => {
            tracing::error!("Failed to initialize detector client: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let controller = UploadController::new(config.detector.detect_options());
    let server = HttpServer::new(controller.clone(), &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    // The page is served while the model loads; uploads before then are
    // displayed without detection.
    let model_handle = tokio::spawn({
        let controller = controller.clone();
        let task = config.detector.task.clone();
        let model = config.detector.model.clone();
        async move {
            controller.load_model(&factory, &task, &model).await;
        }
    });

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    model_handle.abort();
    let _ = shutdown_tx.send(());
    match server_handle.await {
        Ok(Err(e)) => tracing::error!("Server stopped with error: {}", e),
        Err(e) => tracing::error!("Server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

mod deliver;
mod freebusy;
mod process_batch;
mod scheduler;
mod shared;
mod status;

use actix_web::{dev::Server, middleware, web, App, HttpServer};
use scheduler::start_notification_worker;
use smart_notifier_infra::Context;
use std::net::TcpListener;
use tracing_actix_web::TracingLogger;

pub use process_batch::{BatchStats, ProcessBatchUseCase};
pub use shared::usecase::{execute, UseCase};

pub struct Application {
    server: Server,
    port: u16,
}

impl Application {
    pub async fn new(context: Context) -> Result<Self, std::io::Error> {
        let (server, port) = Application::configure_server(context.clone()).await?;
        Application::start_job_schedulers(context);

        Ok(Self { server, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn start_job_schedulers(context: Context) {
        start_notification_worker(context);
    }

    async fn configure_server(context: Context) -> Result<(Server, u16), std::io::Error> {
        let port = context.config.port;
        let address = format!("0.0.0.0:{}", port);
        let listener = TcpListener::bind(&address)?;
        let port = listener.local_addr()?.port();

        let server = HttpServer::new(move || {
            let ctx = context.clone();

            App::new()
                .wrap(middleware::Compress::default())
                .wrap(TracingLogger::default())
                .app_data(web::Data::new(ctx))
                .configure(status::configure_routes)
        })
        .listen(listener)?
        .workers(1)
        .run();

        Ok((server, port))
    }

    pub async fn start(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

use actix_web::{web, HttpResponse};
use serde::Serialize;
use smart_notifier_infra::Context;

#[derive(Debug, Serialize)]
pub struct APIResponse {
    pub ok: bool,
    pub timestamp: i64,
}

async fn health(ctx: web::Data<Context>) -> HttpResponse {
    HttpResponse::Ok().json(APIResponse {
        ok: true,
        timestamp: ctx.sys.get_timestamp_millis(),
    })
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}

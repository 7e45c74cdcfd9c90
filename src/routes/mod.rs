use actix_web::{get, HttpResponse};
use mongodb::bson::doc;

pub mod project;
pub mod user;

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(doc! { "status": "OK", "service": "solar-pms-server" })
}

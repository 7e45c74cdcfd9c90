use actix_cors::Cors;
use actix_web::{middleware::Logger, App, HttpServer};
use std::io;

mod database;
mod error;
mod models;
mod routes;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let db_uri: String =
        std::env::var("MONGODB_URI").unwrap_or_else(|_| String::from("mongodb://localhost:27017"));
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| String::from("8000"))
        .parse()
        .expect("PORT must be a number");

    models::user::load_keys();
    database::connect(db_uri).await;
    log::info!("MongoDB connected");

    log::info!("Starting server on port {port}");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .wrap(models::user::UserAuthenticationMiddlewareFactory)
            .service(routes::health)
            .service(routes::user::login)
            .service(routes::user::create_user)
            .service(routes::user::get_technical_officers)
            .service(routes::user::get_users)
            .service(routes::project::get_project_statistics)
            .service(routes::project::get_projects)
            .service(routes::project::get_project)
            .service(routes::project::create_project)
            .service(routes::project::update_project)
            .service(routes::project::update_project_stage)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

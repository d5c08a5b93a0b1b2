use actix_web::web::{delete, get, post, put, scope, Data};
use actix_web::{App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use synccircle::handlers;
use synccircle::middlewares::access::Access;
use synccircle::middlewares::jwt::{Jwt, JWT_SECRET};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let database_url = dotenv::var("DATABASE_URL").context("environment variable DATABASE_URL not set")?;
    let secret = dotenv::var(JWT_SECRET).context("environment variable JWT_SECRET not set")?.into_bytes();
    let bind_addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".into());
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;
    sqlx::migrate!().run(&pool).await.context("failed to apply migrations")?;
    log::info!("listening on {bind_addr}");
    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(Data::new(pool.clone()))
            .service(
                scope("api")
                    .route("login", post().to(handlers::login))
                    .route("signup", post().to(handlers::signup))
                    .route("logout", post().to(handlers::logout))
                    .service(
                        scope("")
                            .wrap(Jwt::new(secret.clone()))
                            .route("users", get().to(handlers::user::search))
                            .service(
                                scope("spaces")
                                    .route("", post().to(handlers::space::create))
                                    .route("", get().to(handlers::space::list))
                                    .route("join", post().to(handlers::space::join))
                                    .service(
                                        scope("{space_id}")
                                            .wrap(Access::new(
                                                pool.clone(),
                                                "SELECT EXISTS(SELECT id FROM space_members WHERE user_id = $1 AND space_id = $2)",
                                                "space_id",
                                            ))
                                            .route("", get().to(handlers::space::detail))
                                            .route("", put().to(handlers::space::update))
                                            .route("", delete().to(handlers::space::delete_space))
                                            .route("members", post().to(handlers::space::add_members))
                                            .service(
                                                scope("forms")
                                                    .route("", post().to(handlers::form::create))
                                                    .route("", get().to(handlers::form::list)),
                                            ),
                                    ),
                            )
                            .service(
                                scope("forms").service(
                                    scope("{form_id}")
                                        .wrap(Access::new(
                                            pool.clone(),
                                            "SELECT EXISTS(SELECT sm.id FROM space_members AS sm JOIN forms AS f ON sm.space_id = f.space_id WHERE sm.user_id = $1 AND f.id = $2)",
                                            "form_id",
                                        ))
                                        .route("", get().to(handlers::form::detail))
                                        .route("", delete().to(handlers::form::delete_form))
                                        .route("my-response", get().to(handlers::form::my_response))
                                        .route("responses", get().to(handlers::form::responses)),
                                ),
                            )
                            .service(
                                scope("responses")
                                    .route("", post().to(handlers::response::create))
                                    .service(
                                        scope("{response_id}")
                                            .route("", get().to(handlers::response::detail))
                                            .route("", put().to(handlers::response::update)),
                                    ),
                            ),
                    ),
            )
    })
    .bind(&bind_addr)?
    .run()
    .await?;
    Ok(())
}

use structopt::StructOpt;
use tracing::info;

use api::vapid::VapidConfig;
use api::{create_app, AppConfig};

#[derive(StructOpt, Debug)]
#[structopt(name = "env")]
struct Opt {
    #[structopt(long, env = "DATABASE_URL")]
    database_url: String,

    #[structopt(long, env = "ASSETS_DIR", default_value = "web/assets")]
    assets_dir: String,

    #[structopt(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:1337")]
    listen_addr: String,

    #[structopt(long, env = "VAPID_PUBLIC_KEY")]
    vapid_public_key: String,

    #[structopt(long, env = "VAPID_PRIVATE_KEY")]
    vapid_private_key: String,

    /// mailto: or https: URI push services may use to contact the operator.
    #[structopt(long, env = "VAPID_CONTACT")]
    vapid_contact: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    dotenv::dotenv().ok();

    let opt = Opt::from_args();

    let pool = sqlx::SqlitePool::connect(&opt.database_url).await?;
    database::migrate(&pool).await?;

    // Bad credentials abort here, before the listener ever binds.
    let vapid = VapidConfig::new(opt.vapid_public_key, opt.vapid_private_key, opt.vapid_contact)?;

    let app = create_app(AppConfig {
        assets_dir: opt.assets_dir,
        pool,
        vapid,
    })
    .await?;

    let listener = tokio::net::TcpListener::bind(&opt.listen_addr).await?;

    info!("Start http server at {}.", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

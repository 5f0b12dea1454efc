use mongodb::{Client, Database};
use storechat_config::MongoSettings;
use tracing::info;

pub async fn connect(settings: &MongoSettings) -> mongodb::error::Result<Database> {
    let client = Client::with_uri_str(&settings.uri).await?;
    let db = client.database(&settings.database);

    // Round trip a ping so a bad URI fails at startup, not on first request.
    db.run_command(bson::doc! { "ping": 1 }).await?;
    info!(database = %settings.database, "Connected to MongoDB");

    Ok(db)
}

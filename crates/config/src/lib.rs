use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub mongo: MongoSettings,
    pub auth: AuthSettings,
    pub chat: ChatSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    /// Upper bound on a message body, in characters. Oversized bodies are
    /// rejected, never truncated.
    pub max_message_len: usize,
    /// Characters kept for the room-list preview of the latest message.
    pub preview_len: usize,
    pub history_page_size: u32,
}

impl Settings {
    /// Loads `config/default.toml` (optional) and then applies
    /// `STORECHAT_*` environment overrides, e.g. `STORECHAT_SERVER__PORT=9000`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080_i64)?
            .set_default("mongo.uri", "mongodb://localhost:27017")?
            .set_default("mongo.database", "storechat")?
            .set_default("auth.jwt_secret", "dev-secret-change-me")?
            .set_default("chat.max_message_len", 4000_i64)?
            .set_default("chat.preview_len", 120_i64)?
            .set_default("chat.history_page_size", 50_i64)?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("STORECHAT")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

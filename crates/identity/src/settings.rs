use config::{Config, ConfigError, Environment, File, FileFormat};
use error_stack::Report;
use serde::Deserialize;

use countersign_common::error::CountersignError;

use crate::transport::{Endpoint, Scheme};

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub struct EndpointSettings {
    pub authority: String,
    pub scheme: String,
}

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub struct Client {
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub struct Settings {
    pub endpoint: EndpointSettings,
    pub client: Client,
}

impl Settings {
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let environment = Environment::default().prefix("COUNTERSIGN").separator("__");

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()?;

        // You can deserialize (and thus freeze) the entire configuration as
        config.try_deserialize()
    }
}

impl TryFrom<&EndpointSettings> for Endpoint {
    type Error = Report<CountersignError>;

    fn try_from(settings: &EndpointSettings) -> Result<Self, Self::Error> {
        let scheme = match settings.scheme.as_str() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(Report::new(CountersignError::Configuration {
                    message: format!("unsupported endpoint scheme: {other}"),
                }))
            }
        };

        Ok(Self {
            authority: settings.authority.clone(),
            scheme,
        })
    }
}

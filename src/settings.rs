use std::time::Duration;

use anyhow::{Context, Result};
use clap::{App, Arg};
use config::Config;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};

use crate::{
    log::LogSettings, telemetry_endpoint::TelemetryEndpointSettings,
    webhook_receiver::AlertReceiverSettings,
};

static SETTINGS: OnceCell<Settings> = OnceCell::new();

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub defaults: ResponderDefaults,
    pub alert_webhook_receiver: AlertReceiverSettings,
    pub log: LogSettings,
    pub telemetry_endpoint: TelemetryEndpointSettings,
}

/// process wide fallback values for every per alert action field,
/// read once at startup and never mutated afterwards
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct ResponderDefaults {
    /// login user for the ssh action path
    #[serde(default)]
    pub user: String,
    /// path of the ssh private key file, empty means no public key auth
    #[serde(default)]
    pub ssh_key: String,
    /// ssh password, only used when no key is configured
    #[serde(default)]
    pub ssh_password: String,
    /// path of the known hosts file, an empty path accepts any host key
    #[serde(default)]
    pub ssh_known_hosts: String,
    /// host key algorithms offered during the handshake, in order,
    /// empty means library default
    #[serde(default)]
    pub ssh_host_key_algorithms: Vec<String>,
    #[serde_as(as = "DurationSeconds<f64>")]
    #[serde(default = "default_connection_timeout")]
    pub ssh_connection_timeout: Duration,
    #[serde_as(as = "DurationSeconds<f64>")]
    #[serde(default = "default_command_timeout")]
    pub ssh_command_timeout: Duration,
    #[serde_as(as = "DurationSeconds<f64>")]
    #[serde(default = "default_command_timeout")]
    pub local_command_timeout: Duration,
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for ResponderDefaults {
    fn default() -> Self {
        Self {
            user: String::new(),
            ssh_key: String::new(),
            ssh_password: String::new(),
            ssh_known_hosts: String::new(),
            ssh_host_key_algorithms: Vec::new(),
            ssh_connection_timeout: default_connection_timeout(),
            ssh_command_timeout: default_command_timeout(),
            local_command_timeout: default_command_timeout(),
        }
    }
}

impl Settings {
    pub fn global() -> &'static Self {
        SETTINGS.get_or_init(|| {
            match Self::load().context("failed to load config and command line arguments") {
                Ok(settings) => settings,
                Err(err) => {
                    // tracing wasn't setup yet
                    panic!("{:#?}", err);
                }
            }
        })
    }

    fn load() -> Result<Self> {
        let opts = App::new(clap::crate_name!())
            .version(clap::crate_version!())
            .about(clap::crate_description!())
            .args(&[
                Arg::new("config")
                    .help("path of config file")
                    .takes_value(true)
                    .short('c')
                    .long("config")
                    .default_value("./config.yaml"),
                Arg::new("level")
                    .help("log level")
                    .possible_values(["Error", "Warn", "Info", "Debug", "Trace"])
                    .ignore_case(true)
                    .takes_value(true)
                    .long("log"),
            ])
            .get_matches();

        #[allow(clippy::expect_used)]
        let config_path = opts.value_of("config").expect("--config has a default value");

        let conf = Config::builder()
            .add_source(config::File::with_name(config_path))
            .build()
            .context("can't load config")?;

        let mut settings: Settings = conf.try_deserialize().context("can't load config")?;

        if let Some(level) = opts.value_of("level") {
            settings.log.level = level.to_string();
        }

        Ok(settings)
    }
}

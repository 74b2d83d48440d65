use super::{ConfigError, Lookup};
use crate::models::Address;

/// Deployed FlightSurety contract addresses.
///
/// Only the app contract is called; the data contract address is reported at
/// startup so operators can confirm the deployment pair.
#[derive(Clone, Debug)]
pub struct ContractsConfig {
    pub app_address: Address,
    pub data_address: Option<Address>,
}

impl ContractsConfig {
    pub(crate) fn from_lookup(lookup: &Lookup<'_>) -> Result<Self, ConfigError> {
        let app_address = lookup("FLIGHT_SURETY_APP_ADDRESS")
            .filter(|raw| !raw.trim().is_empty())
            .ok_or(ConfigError::Missing("FLIGHT_SURETY_APP_ADDRESS"))?;

        let data_address = lookup("FLIGHT_SURETY_DATA_ADDRESS").filter(|raw| !raw.trim().is_empty());

        Ok(Self {
            app_address: parse_address("FLIGHT_SURETY_APP_ADDRESS", &app_address)?,
            data_address: data_address
                .map(|raw| parse_address("FLIGHT_SURETY_DATA_ADDRESS", &raw))
                .transpose()?,
        })
    }
}

fn parse_address(key: &'static str, raw: &str) -> Result<Address, ConfigError> {
    raw.trim().parse().map_err(|err| ConfigError::Invalid {
        key,
        reason: format!("{err}"),
    })
}

use core::fmt;

use heapless::String;
use serde::Serialize;

use super::{DeviceIdentity, AESKey, EUI64};
use crate::region::Region;
use crate::service::JoinStatus;

/// Shortest application transmit interval an operator may request, in seconds
pub const MIN_TX_DUTY_SEC: u32 = 10;

/// Duty cycle used when nothing has been configured, in seconds
pub const DEFAULT_TX_DUTY_SEC: u32 = MIN_TX_DUTY_SEC;

/// Confirmed-transmission retries used when nothing has been configured
pub const DEFAULT_CONFIRM_RETRIES: u32 = 1;

/// Identifier fields accepted by a configuration write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Device EUI
    DevEui,
    /// Application EUI
    AppEui,
    /// Application key
    AppKey,
}

impl Field {
    /// Parameter name used by the configuration layer
    pub fn name(self) -> &'static str {
        match self {
            Field::DevEui => "deviceEUI",
            Field::AppEui => "appEUI",
            Field::AppKey => "appKey",
        }
    }
}

/// Rejected configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Region id is unknown
    InvalidRegion(u8),
    /// Sub-band is outside `1..=max` for the region
    SubbandOutOfRange {
        /// Requested sub-band
        subband: u8,
        /// Highest sub-band of the region
        max: u8,
    },
    /// Required identifier was not supplied
    MissingField(Field),
    /// Identifier has the wrong number of hex digits
    WrongLength {
        /// Offending field
        field: Field,
        /// Expected number of hex digits
        expected: usize,
    },
    /// Identifier contains non-hexadecimal characters
    NotHex(Field),
    /// Duty cycle below [`MIN_TX_DUTY_SEC`]
    DutyCycleTooShort(u32),
    /// Confirmed retry count of zero
    InvalidRetryCount(u32),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidRegion(id) => write!(f, "invalid or unsupported region id {}", id),
            ValidationError::SubbandOutOfRange { subband, max } => {
                write!(f, "sub-band {} out of range 1..={} for region", subband, max)
            }
            ValidationError::MissingField(field) => write!(f, "EUI not present: {}", field.name()),
            ValidationError::WrongLength { field, expected } => {
                write!(f, "wrong length for {}, expected {} hex digits", field.name(), expected)
            }
            ValidationError::NotHex(field) => {
                write!(f, "{} contains non-hexadecimal characters", field.name())
            }
            ValidationError::DutyCycleTooShort(secs) => write!(
                f,
                "transmit interval {} s is below the minimum of {} s",
                secs, MIN_TX_DUTY_SEC
            ),
            ValidationError::InvalidRetryCount(n) => {
                write!(f, "confirmed retry count {} must be at least 1", n)
            }
        }
    }
}

/// Connection parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Regional channel plan
    pub region: Region,
    /// Sub-band for the initial join, `1..=region.max_subband()`
    pub subband: u8,
    /// Requested application transmit interval in seconds
    pub tx_duty_sec: u32,
    /// Retries for a confirmed transmission
    pub confirm_retries: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            region: Region::default(),
            subband: 1,
            tx_duty_sec: DEFAULT_TX_DUTY_SEC,
            confirm_retries: DEFAULT_CONFIRM_RETRIES,
        }
    }
}

impl ConnectionConfig {
    /// Check every invariant, reporting the first violation
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.region.accepts_subband(self.subband) {
            return Err(ValidationError::SubbandOutOfRange {
                subband: self.subband,
                max: self.region.max_subband(),
            });
        }
        if self.tx_duty_sec < MIN_TX_DUTY_SEC {
            return Err(ValidationError::DutyCycleTooShort(self.tx_duty_sec));
        }
        if self.confirm_retries == 0 {
            return Err(ValidationError::InvalidRetryCount(0));
        }
        Ok(())
    }

    /// Build a config from raw stored values, repairing anything invalid
    pub fn normalized(region_id: u8, subband: u8, tx_duty_sec: u32, confirm_retries: u32) -> Self {
        let region = Region::from_id(region_id).unwrap_or_default();
        let subband = if region.accepts_subband(subband) { subband } else { 1 };
        Self {
            region,
            subband,
            tx_duty_sec: tx_duty_sec.max(MIN_TX_DUTY_SEC),
            confirm_retries: confirm_retries.max(1),
        }
    }

    /// Whether switching to `other` invalidates the current session
    pub fn differs_in_plan(&self, other: &ConnectionConfig) -> bool {
        self.region != other.region || self.subband != other.subband
    }
}

/// Configuration write as submitted by the configuration layer
///
/// Absent optional values keep their current setting; the application EUI
/// defaults to all zeroes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigRequest<'a> {
    /// Region id
    pub region: Option<u8>,
    /// Sub-band
    pub subband: Option<u8>,
    /// Device EUI as 16 hex digits
    pub dev_eui: Option<&'a str>,
    /// Application EUI as 16 hex digits
    pub app_eui: Option<&'a str>,
    /// Application key as 32 hex digits
    pub app_key: Option<&'a str>,
    /// Requested transmit interval in seconds
    pub tx_duty_sec: Option<u32>,
    /// Confirmed retry count
    pub confirm_retries: Option<u32>,
}

impl<'a> ConfigRequest<'a> {
    /// Validate against the current configuration and produce the values to apply
    pub fn validate(
        &self,
        current: &ConnectionConfig,
    ) -> Result<(DeviceIdentity, ConnectionConfig), ValidationError> {
        let region = match self.region {
            Some(id) => Region::from_id(id).ok_or(ValidationError::InvalidRegion(id))?,
            None => current.region,
        };

        let subband = self.subband.unwrap_or(current.subband);
        if !region.accepts_subband(subband) {
            return Err(ValidationError::SubbandOutOfRange {
                subband,
                max: region.max_subband(),
            });
        }

        let dev_eui: EUI64 = parse_hex(Field::DevEui, self.dev_eui, true)?;
        let app_eui: EUI64 = parse_hex(Field::AppEui, self.app_eui, false)?;
        let app_key: AESKey = parse_hex(Field::AppKey, self.app_key, true)?;

        let tx_duty_sec = self.tx_duty_sec.unwrap_or(current.tx_duty_sec);
        if tx_duty_sec < MIN_TX_DUTY_SEC {
            return Err(ValidationError::DutyCycleTooShort(tx_duty_sec));
        }

        let confirm_retries = self.confirm_retries.unwrap_or(current.confirm_retries);
        if confirm_retries == 0 {
            return Err(ValidationError::InvalidRetryCount(confirm_retries));
        }

        Ok((
            DeviceIdentity::new(dev_eui, app_eui, app_key),
            ConnectionConfig {
                region,
                subband,
                tx_duty_sec,
                confirm_retries,
            },
        ))
    }
}

fn parse_hex<const N: usize>(
    field: Field,
    value: Option<&str>,
    required: bool,
) -> Result<[u8; N], ValidationError> {
    let mut out = [0u8; N];
    let Some(text) = value else {
        return if required {
            Err(ValidationError::MissingField(field))
        } else {
            Ok(out)
        };
    };
    if text.len() != 2 * N {
        return Err(ValidationError::WrongLength {
            field,
            expected: 2 * N,
        });
    }
    hex::decode_to_slice(text, &mut out).map_err(|_| ValidationError::NotHex(field))?;
    Ok(out)
}

/// Lower-case hex rendering of an identifier
pub fn to_hex(bytes: &[u8]) -> String<32> {
    let mut buf = [0u8; 32];
    let mut out = String::new();
    let Some(slot) = buf.get_mut(..bytes.len() * 2) else {
        return out;
    };
    if hex::encode_to_slice(bytes, slot).is_ok() {
        if let Ok(text) = core::str::from_utf8(slot) {
            let _ = out.push_str(text);
        }
    }
    out
}

/// Configuration read, as served to the configuration layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigReport {
    /// Region id
    pub region: u8,
    /// DevEUI derived from the hardware unique id
    #[serde(rename = "deviceEUI_default")]
    pub default_dev_eui: String<32>,
    /// Configured DevEUI, or the hardware default when unconfigured
    #[serde(rename = "deviceEUI")]
    pub dev_eui: String<32>,
    /// Configured AppEUI, empty when unconfigured
    #[serde(rename = "appEUI")]
    pub app_eui: String<32>,
    /// Configured AppKey, empty when unconfigured
    #[serde(rename = "appKey")]
    pub app_key: String<32>,
    /// Sub-band
    pub subband: u8,
    /// Join state reported by the service
    pub join: JoinStatus,
    /// Requested transmit interval in seconds
    pub tx_duty_sec: u32,
    /// Confirmed retry count
    pub tx_retries: u32,
    /// Whether a confirmed transmission is awaiting its result
    pub tx_waiting_confirm: bool,
}

use serde::Serialize;

use crate::config::{DeviceClass, DeviceIdentity, FrameCounters, SessionKeys};
use crate::region::Region;

/// Join state as reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JoinStatus {
    /// No join requested since the last init
    #[serde(rename = "RESET")]
    Reset,
    /// Join request in flight
    #[serde(rename = "ONGOING")]
    Ongoing,
    /// Joined to the network
    #[serde(rename = "SET")]
    Joined,
    /// Last join attempt failed
    #[serde(rename = "FAILED")]
    Failed,
}

/// Parameters for initializing the MAC stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitParams {
    /// Regional channel plan
    pub region: Region,
    /// Sub-band for the initial join
    pub subband: u8,
    /// Retries for confirmed transmissions
    pub confirm_retries: u32,
    /// Session material was pushed with `set_session`; join without negotiation
    pub restore_session: bool,
}

/// Marker error for a join the network did not accept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinRejected;

/// Asynchronous notification from the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEvent<'a> {
    /// Network joined
    Joined,
    /// Join attempt failed
    JoinFailed,
    /// Downlink received
    Received {
        /// Frame port
        port: u8,
        /// Decrypted payload
        payload: &'a [u8],
    },
    /// Outcome of the last confirmed uplink
    ConfirmResult(bool),
    /// Device class switch completed
    ClassChanged(DeviceClass),
}

/// Generic LoRaWAN service interface
///
/// Implemented by the binding to the MAC/radio stack. None of these calls
/// may call back into the link synchronously; completions are reported as
/// [`ServiceEvent`]s.
pub trait LoRaWanService {
    /// Error type for service operations
    type Error;

    /// Hardware unique id, used to derive the default DevEUI
    fn unique_id(&self) -> u64;

    /// Bring up the radio hardware
    fn init_hardware(&mut self) -> Result<(), Self::Error>;

    /// Load DevEUI, AppEUI and AppKey into the stack
    fn set_identity(&mut self, identity: &DeviceIdentity);

    /// Load previously negotiated session material into the stack
    fn set_session(&mut self, keys: &SessionKeys, counters: FrameCounters);

    /// Initialize the MAC for a region and sub-band
    fn init(&mut self, params: &InitParams) -> Result<(), Self::Error>;

    /// Start a join
    fn join(&mut self) -> Result<(), Self::Error>;

    /// Current join state
    fn join_status(&self) -> JoinStatus;

    /// Poll join completion. `WouldBlock` while the join is in flight.
    fn poll_join(&mut self) -> nb::Result<(), JoinRejected> {
        match self.join_status() {
            JoinStatus::Joined => Ok(()),
            JoinStatus::Failed => Err(nb::Error::Other(JoinRejected)),
            JoinStatus::Reset | JoinStatus::Ongoing => Err(nb::Error::WouldBlock),
        }
    }

    /// Transmit a payload on `port`
    fn send(&mut self, port: u8, payload: &[u8], confirmed: bool) -> Result<(), Self::Error>;

    /// Request a device class switch
    fn request_class(&mut self, class: DeviceClass) -> Result<(), Self::Error>;

    /// Session material negotiated by the last join
    fn session_keys(&self) -> Option<SessionKeys>;

    /// Current frame counters
    fn frame_counters(&self) -> FrameCounters;

    /// Overwrite the frame counters
    fn set_frame_counters(&mut self, counters: FrameCounters);
}

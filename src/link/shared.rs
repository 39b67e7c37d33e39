use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use super::Link;
use crate::service::LoRaWanService;
use crate::store::CredentialStore;
use crate::time::Clock;

/// The link was already borrowed by the same execution context
///
/// Returned when a subscriber, invoked from inside a link operation, calls
/// back into the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkBusy;

impl fmt::Display for LinkBusy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("link is busy in an enclosing call")
    }
}

/// A [`Link`] behind a single blocking mutex
///
/// `tick`, service notifications and configuration writes may come from
/// different execution contexts (a main loop, a radio interrupt, a web
/// handler). All of them go through [`SharedLink::lock`], so at most one
/// runs link logic at a time.
pub struct SharedLink<M, S, K, C>
where
    M: RawMutex,
    S: LoRaWanService,
    K: CredentialStore,
    C: Clock,
{
    inner: Mutex<M, RefCell<Link<S, K, C, M>>>,
}

impl<M, S, K, C> SharedLink<M, S, K, C>
where
    M: RawMutex,
    S: LoRaWanService,
    K: CredentialStore,
    C: Clock,
{
    /// Wrap `link`
    pub fn new(link: Link<S, K, C, M>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(link)),
        }
    }

    /// Run `f` with exclusive access to the link
    pub fn lock<R>(&self, f: impl FnOnce(&mut Link<S, K, C, M>) -> R) -> Result<R, LinkBusy> {
        self.inner.lock(|cell| {
            let mut link = cell.try_borrow_mut().map_err(|_| LinkBusy)?;
            Ok(f(&mut link))
        })
    }

    /// Unwrap the link
    pub fn into_inner(self) -> Link<S, K, C, M> {
        self.inner.into_inner().into_inner()
    }
}

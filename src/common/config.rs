//! Configuration constants and swapper options.

use std::fmt;
use std::sync::Arc;

use crate::common::PageId;

/// Default page size in bytes (8KB).
///
/// Every page of a file has the same size; the size is a parameter of the
/// swapper, so this is only the value used when callers have no preference.
pub const DEFAULT_PAGE_SIZE: usize = 8192;

/// Default number of channels a swapper opens on its file.
///
/// `1` disables striping.
pub const DEFAULT_CHANNEL_STRIPES: usize = 1;

/// Upper bound on channel stripes accepted by [`SwapperConfig`].
pub const MAX_CHANNEL_STRIPES: usize = 64;

/// How many consecutive transient failures the swapper absorbs for a single
/// page transfer before giving up and returning the error.
///
/// Progress resets the counter, so a slow but advancing transfer never
/// hits this limit.
pub const MAX_IO_RETRIES: u32 = 1024;

/// Callback invoked when a page is evicted from memory.
pub type EvictionCallback = Arc<dyn Fn(PageId) + Send + Sync>;

/// Options for opening a page swapper.
///
/// # Example
/// ```
/// use graphpage::common::config::SwapperConfig;
///
/// let config = SwapperConfig::default().with_create(true).with_channel_stripes(4);
/// assert!(config.create);
/// assert_eq!(config.channel_stripes, 4);
/// ```
#[derive(Clone)]
pub struct SwapperConfig {
    /// Create the file if it does not exist.
    pub create: bool,

    /// Number of channels opened on the file; page `p` uses `p % stripes`.
    pub channel_stripes: usize,

    /// Invoked from [`PageSwapper::evicted`](crate::storage::PageSwapper::evicted)
    /// until the swapper is closed.
    pub eviction_callback: Option<EvictionCallback>,
}

impl SwapperConfig {
    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Set the stripe count, clamped to `1..=MAX_CHANNEL_STRIPES`.
    pub fn with_channel_stripes(mut self, stripes: usize) -> Self {
        self.channel_stripes = stripes.clamp(1, MAX_CHANNEL_STRIPES);
        self
    }

    pub fn with_eviction_callback(mut self, callback: EvictionCallback) -> Self {
        self.eviction_callback = Some(callback);
        self
    }
}

impl Default for SwapperConfig {
    fn default() -> Self {
        Self {
            create: false,
            channel_stripes: DEFAULT_CHANNEL_STRIPES,
            eviction_callback: None,
        }
    }
}

impl fmt::Debug for SwapperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapperConfig")
            .field("create", &self.create)
            .field("channel_stripes", &self.channel_stripes)
            .field("eviction_callback", &self.eviction_callback.is_some())
            .finish()
    }
}

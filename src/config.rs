//! Configuration options for scans over segments.

/// Options controlling predicate compilation and segment reads.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Upper bound on the number of scan keys the compiler may generate.
    /// Default: 48
    pub max_scan_key_num: usize,

    /// Skip whole segments whose zone maps cannot satisfy a predicate.
    /// Default: true
    pub enable_zone_map_pruning: bool,

    /// Allow the scan key compiler to enumerate small integer/date
    /// intervals into fixed values.
    /// Default: true
    pub enable_range_to_fixed_conversion: bool,

    /// Number of rows a segment iterator reads per column batch.
    /// Default: 1024
    pub batch_size: usize,

    /// Hint that the tablet should be kept in memory.
    /// Default: false
    pub kept_in_memory: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_scan_key_num: 48,
            enable_zone_map_pruning: true,
            enable_range_to_fixed_conversion: true,
            batch_size: 1024,
            kept_in_memory: false,
        }
    }
}

/// Compression algorithms supported for segment pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    None = 0,

    /// Snappy compression (fast, moderate compression ratio).
    #[cfg(feature = "snappy")]
    Snappy = 1,

    /// LZ4 compression (very fast, lower compression ratio).
    #[cfg(feature = "lz4-compression")]
    Lz4 = 2,
}

impl CompressionType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            #[cfg(feature = "snappy")]
            1 => Some(CompressionType::Snappy),
            #[cfg(feature = "lz4-compression")]
            2 => Some(CompressionType::Lz4),
            _ => None,
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "snappy")]
        return CompressionType::Snappy;

        #[cfg(not(feature = "snappy"))]
        CompressionType::None
    }
}

impl ScanOptions {
    /// Creates a new ScanOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scan key budget.
    pub fn max_scan_key_num(mut self, value: usize) -> Self {
        self.max_scan_key_num = value;
        self
    }

    /// Enables or disables zone-map pruning.
    pub fn enable_zone_map_pruning(mut self, value: bool) -> Self {
        self.enable_zone_map_pruning = value;
        self
    }

    /// Enables or disables interval enumeration in the scan key compiler.
    pub fn enable_range_to_fixed_conversion(mut self, value: bool) -> Self {
        self.enable_range_to_fixed_conversion = value;
        self
    }

    /// Sets the iterator batch size.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the in-memory hint.
    pub fn kept_in_memory(mut self, value: bool) -> Self {
        self.kept_in_memory = value;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_scan_key_num == 0 {
            return Err(crate::Error::invalid_argument("max_scan_key_num must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(crate::Error::invalid_argument("batch_size must be > 0"));
        }
        Ok(())
    }
}

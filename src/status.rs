//! Device status word decoding.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Status bits reported by `tlccs_getDeviceStatus`.
    ///
    /// Unknown bits are retained so the raw word round-trips.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceStatus: i32 {
        /// Waiting for a software trigger.
        const IDLE_SOFT_TRIGGER = tlccs_sys::TLCCS_STATUS_SCAN_IDLE;
        /// Scan in progress.
        const SCAN_IN_PROGRESS = tlccs_sys::TLCCS_STATUS_SCAN_TRIGGERED;
        /// Scan starting.
        const SCAN_STARTING = tlccs_sys::TLCCS_STATUS_SCAN_START_TRANS;
        /// Scan done, data ready for transfer.
        const SCAN_READY = tlccs_sys::TLCCS_STATUS_SCAN_TRANSFER;
        /// Waiting for an external trigger.
        const IDLE_EXT_TRIGGER = tlccs_sys::TLCCS_STATUS_WAIT_FOR_EXT_TRIG;

        const _ = !0;
    }
}

impl DeviceStatus {
    /// Decode a raw status word.
    pub fn from_raw(raw: i32) -> Self {
        Self::from_bits_retain(raw)
    }

    /// Ready to start a software-triggered scan.
    pub fn is_idle_soft_trigger(self) -> bool {
        self.contains(Self::IDLE_SOFT_TRIGGER)
    }

    /// Armed and waiting for an external trigger.
    pub fn is_idle_ext_trigger(self) -> bool {
        self.contains(Self::IDLE_EXT_TRIGGER)
    }

    /// A scan has been started and is not yet finished.
    pub fn is_scanning(self) -> bool {
        self.intersects(Self::SCAN_STARTING | Self::SCAN_IN_PROGRESS)
    }

    /// Scan data can be read.
    pub fn is_scan_ready(self) -> bool {
        self.contains(Self::SCAN_READY)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        if names.is_empty() {
            write!(f, "NONE ({:#06x})", self.bits())
        } else {
            write!(f, "{} ({:#06x})", names.join(" | "), self.bits())
        }
    }
}

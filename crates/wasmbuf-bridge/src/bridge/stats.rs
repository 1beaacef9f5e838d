//! Counters describing what a bridge instance has done.

use serde::Serialize;

/// Lease accounting for one bridge instance.
///
/// `leased` counts regions the bridge allocated itself, `adopted` counts
/// result regions it took over from the scratch slot. Every one of them must
/// eventually show up in `released`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LeaseLedger {
    /// Successful `alloc` calls
    pub leased: u64,
    /// Result regions taken over from the module
    pub adopted: u64,
    /// Successful `free` calls
    pub released: u64,
}

impl LeaseLedger {
    /// Leases that have not been released yet.
    pub fn outstanding(&self) -> u64 {
        (self.leased + self.adopted).saturating_sub(self.released)
    }
}

/// Timing and fuel for a single transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallMetrics {
    /// Time spent inside the transform export, in microseconds
    pub execution_time_us: u64,
    /// Fuel consumed by the export (if fuel metering enabled)
    pub fuel_consumed: Option<u64>,
}

/// Running totals for a bridge instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// Transfers started
    pub calls: u64,
    /// Transfers that ended in a translated trap
    pub traps: u64,
    /// Input bytes copied into the sandbox
    pub bytes_in: u64,
    /// Result bytes handed to the host (copied or lent)
    pub bytes_out: u64,
    /// Times the memory view cache found linear memory had moved or grown
    pub view_refreshes: u64,
    /// Lease accounting
    pub leases: LeaseLedger,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outstanding_counts_adopted_leases() {
        let ledger = LeaseLedger {
            leased: 3,
            adopted: 2,
            released: 4,
        };
        assert_eq!(ledger.outstanding(), 1);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = BridgeStats {
            calls: 2,
            traps: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).expect("serialize");
        assert_eq!(json["calls"], 2);
        assert_eq!(json["traps"], 1);
        assert_eq!(json["leases"]["released"], 0);
    }
}

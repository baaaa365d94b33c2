//! Recognized AMM program IDs and venue detection.

/// Raydium AMM v4 (legacy). Instruction tags 9/11 are swapBaseIn/Out.
pub const RAYDIUM_AMM_V4_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const RAYDIUM_CPMM_PROGRAM_ID: &str = "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C";
pub const RAYDIUM_CLMM_PROGRAM_ID: &str = "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK";
pub const ORCA_WHIRLPOOL_PROGRAM_ID: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";
pub const METEORA_DLMM_PROGRAM_ID: &str = "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo";
pub const PUMP_FUN_AMM_PROGRAM_ID: &str = "pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA";

/// Raydium AMM v4 swap instruction tags.
pub const SWAP_BASE_IN_TAG: u8 = 9;
pub const SWAP_BASE_OUT_TAG: u8 = 11;

/// Venue label for a recognized AMM program ID.
pub fn venue_for_program(program_id: &str) -> Option<&'static str> {
    match program_id {
        RAYDIUM_AMM_V4_PROGRAM_ID | RAYDIUM_CPMM_PROGRAM_ID | RAYDIUM_CLMM_PROGRAM_ID => {
            Some("raydium")
        }
        ORCA_WHIRLPOOL_PROGRAM_ID => Some("orca"),
        METEORA_DLMM_PROGRAM_ID => Some("meteora"),
        PUMP_FUN_AMM_PROGRAM_ID => Some("pumpfun"),
        _ => None,
    }
}

pub fn is_amm_program(program_id: &str) -> bool {
    venue_for_program(program_id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_detection() {
        assert_eq!(venue_for_program(RAYDIUM_AMM_V4_PROGRAM_ID), Some("raydium"));
        assert_eq!(venue_for_program(ORCA_WHIRLPOOL_PROGRAM_ID), Some("orca"));
        assert_eq!(venue_for_program("11111111111111111111111111111111"), None);
        assert!(is_amm_program(PUMP_FUN_AMM_PROGRAM_ID));
    }
}

use serde::{ Deserialize, Serialize };
use std::fs;
use std::path::Path;
use once_cell::sync::Lazy;
use std::sync::{ RwLock, Mutex };
use std::env;

pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| { Mutex::new(env::args().collect()) });

/// Loaded configuration, set once at startup via init_configs()
static CONFIGS: Lazy<RwLock<Option<Configs>>> = Lazy::new(|| RwLock::new(None));

/// Check if debug mode for a specific log tag is enabled via command line args
pub fn is_debug_enabled_for(label: &str) -> bool {
    if let Ok(args) = CMD_ARGS.lock() {
        args.contains(&format!("--debug-{}", label))
    } else {
        false
    }
}

/// Check if debug payments mode is enabled via command line args
pub fn is_debug_payments_enabled() -> bool {
    is_debug_enabled_for("payments")
}

/// Check if debug rpc mode is enabled via command line args
pub fn is_debug_rpc_enabled() -> bool {
    is_debug_enabled_for("rpc")
}

/// Represents the runtime configuration loaded from configs.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configs {
    pub rpc_url: String,
    pub rpc_fallback_url: Option<String>,
    /// Address every wallet payment must be made to
    pub platform_wallet: String,
    /// Internal account credited with entry fees
    pub prize_pool_account: String,
    /// Internal account credited with marketplace commissions
    pub platform_account: String,
    /// Mint address of the tracked stable token (e.g. USDC)
    pub tracked_token_mint: String,
    /// Marketplace commission percent applied when no per-seller override exists
    pub default_commission_percent: u8,
    /// Payment methods the platform accepts: "balance" and/or "wallet"
    pub allowed_payment_methods: Vec<String>,
    pub ledger_db_path: String,
}

/// Reads the configs.json file and returns a Configs object
pub fn read_configs<P: AsRef<Path>>(path: P) -> Result<Configs, Box<dyn std::error::Error>> {
    let data = fs::read_to_string(path)?;
    let configs: Configs = serde_json::from_str(&data)?;
    if configs.default_commission_percent > 100 {
        return Err(
            format!(
                "Invalid default_commission_percent: {} (must be 0-100)",
                configs.default_commission_percent
            ).into()
        );
    }
    Ok(configs)
}

/// Load configs from disk and store them in the global slot
pub fn init_configs<P: AsRef<Path>>(path: P) -> Result<Configs, Box<dyn std::error::Error>> {
    let configs = read_configs(path)?;
    if let Ok(mut slot) = CONFIGS.write() {
        *slot = Some(configs.clone());
    }
    Ok(configs)
}

/// Get a clone of the loaded configs
pub fn get_configs() -> Result<Configs, Box<dyn std::error::Error>> {
    let slot = CONFIGS.read().map_err(|e| format!("Configs lock poisoned: {}", e))?;
    slot.clone().ok_or_else(|| "Configs not initialized (call init_configs first)".into())
}

/// Returns the positional command-line argument at `index`, or `default`
pub fn get_arg(index: usize, default: &str) -> String {
    std::env::args().nth(index).unwrap_or_else(|| default.to_string())
}

/// Exchange id from the first argument, lowercased
pub fn get_exchange(default: &str) -> String {
    get_arg(1, default).to_lowercase()
}

/// Config file path from the second argument
pub fn get_config_path(default: &str) -> String {
    get_arg(2, default)
}

use tracksync_engine::adapters::AVAILABLE_ADAPTERS;

/// Execute the `adapters` command: list the adapters `adapter.use` accepts.
pub fn execute() {
    println!("Available adapters:");
    for name in AVAILABLE_ADAPTERS {
        println!("  {name}");
    }
}

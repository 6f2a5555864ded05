#[tokio::main]
async fn main() {
    // Panics must not land on stdout
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("ask-ai PANIC: {}", panic_info);
        if let Some(location) = panic_info.location() {
            eprintln!("  at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    ask_ai::init_logging();
    log::info!("Ask AI sidecar starting...");

    if let Err(e) = ask_ai::run().await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

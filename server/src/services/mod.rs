pub mod roster_loader;
pub mod source_fetcher;
pub mod status_poller;

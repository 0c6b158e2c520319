fn main() {
    if let Err(err) = lead_ingest::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

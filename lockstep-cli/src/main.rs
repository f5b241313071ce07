fn main() {
    if let Err(e) = lockstep_cli::run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

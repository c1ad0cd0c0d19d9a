fn main() {
    if let Err(err) = prr_traces_lib::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

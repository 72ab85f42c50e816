fn main() {
    if let Err(err) = citemap::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn main() {
    if let Err(error) = expc_drv::main() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

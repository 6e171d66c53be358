fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = kakuyomu_dl::cli::Args::parse();
    kakuyomu_dl::cli::init_tracing(args.verbose);
    if let Err(e) = kakuyomu_dl::cli::run(&args) {
        eprintln!("{}", e);
        if args.show_error_chain() {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}

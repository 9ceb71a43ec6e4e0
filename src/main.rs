use log::error;

fn main() {
    let cli = ocho::cli::init();
    if let Err(e) = ocho::cli::run(&cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

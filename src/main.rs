fn main() {
    if let Err(err) = sentra::cli::run() {
        sentra::ui::eprintln_error(&err);
        std::process::exit(sentra::exit::exit_code(&err));
    }
}

fn main() {
    if let Err(err) = ipa_sideloader_lib::run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn main() {
    if handle_cli_flags() {
        return;
    }

    if let Err(err) = caption_tui::run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> bool {
    let mut saw_flag = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("Caption-TUI {}", caption_tui::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "Caption-TUI: pick an image and get a caption for it from the terminal.\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n\nConfig:   {}\nEndpoint: {} (override with CAPTION_TUI_SERVICE__ENDPOINT)",
                    caption_tui::config::default_path()
                        .map(|path| path.display().to_string())
                        .unwrap_or_else(|| "(no config directory)".to_string()),
                    caption_tui::config::DEFAULT_ENDPOINT
                );
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}

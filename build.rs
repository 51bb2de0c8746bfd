fn main() {
    // The Tauri context (tauri.conf.json, icons) is only generated for the desktop shell.
    #[cfg(feature = "desktop")]
    tauri_build::build();
}

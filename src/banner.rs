// src/banner.rs

/// Prints the application startup banner to the console.
pub fn print_banner() {
    // Using a raw string literal for the multi-line banner
    let banner = r#"
                        ___  _            _
  ___ _ __   ___  ___  |__ \| |_ ___  ___| |_
 / __| '_ \ / _ \/ __|    ) | __/ _ \/ __| __|
 \__ \ |_) |  __/ (__    / /| ||  __/\__ \ |_
 |___/ .__/ \___|\___|  |_|  \__\___||___/\__|
     |_|

    Spec → pytest generator
"#;
    println!("{}", banner);
}

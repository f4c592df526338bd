use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Config template, embedded by `config::create_default_config_template`
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| "./".to_string());
    let template_path = Path::new(&out_dir).join("avbridge.template.toml");

    let template = r#"# avbridge configuration
# Copy this file to 'avbridge.toml' next to your binary's working directory.
# Environment variables (AVBRIDGE_*) take precedence over these values.

# Directory searched first for libavutil/libavcodec/libavformat
# library_dir = "/opt/ffmpeg/lib"

# Directory holding libavbridge_shim (exclusive when set)
# shim_dir = "/opt/avbridge/lib"

# Size of the buffer handed to native custom I/O
io_buffer_size = 32768

# Force raw struct writes on or off (default: platform decides)
# direct_struct_write = true
"#;

    let _ = fs::write(template_path, template);
    println!("cargo:rerun-if-changed=build.rs");
}

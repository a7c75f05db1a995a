use std::fs;
use std::path::Path;

use crate::cli::commands::InitArgs;
use crate::io::config_io;
use crate::model::config::RootConfig;

const DEFAULT_ROOT: &str = "notes";

const WELCOME_NOTE: &str = "# Inbox\n\n- [ ] try `qr scan` and `qr items`\n";

/// Create `quire.toml` in `dir`. Missing root directories are created; the
/// default `notes/` root gets a starter inbox note.
pub fn cmd_init(dir: &Path, args: InitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let paths = if args.roots.is_empty() {
        vec![DEFAULT_ROOT.to_string()]
    } else {
        args.roots
    };

    let roots: Vec<RootConfig> = paths.iter().map(RootConfig::new).collect();
    let config_path = config_io::init_config(dir, &roots)?;

    for path in &paths {
        let abs = dir.join(path);
        if abs.exists() {
            continue;
        }
        fs::create_dir_all(&abs)?;
        if path == DEFAULT_ROOT {
            fs::write(abs.join("inbox.md"), WELCOME_NOTE)?;
        }
    }

    println!("created {}", config_path.display());
    for path in &paths {
        println!("  root: {}", path);
    }
    println!("run `qr scan` to build the index");
    Ok(())
}

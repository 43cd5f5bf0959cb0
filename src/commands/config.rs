// Config command for reading and changing configuration options

use crate::cli::ConfigAction;
use crate::config::{self as settings, Configuration, OPTIONS};
use crate::ui;

pub fn config(action: ConfigAction) -> anyhow::Result<i32> {
    let mut config = Configuration::load()?;

    match action {
        ConfigAction::List => {
            ui::dim(&format!("{}", settings::config_path().display()));
            for option in OPTIONS {
                ui::line(&format!(
                    "{:<24} {:<8} {}",
                    option.name,
                    option.kind.name(),
                    (option.get)(&config)
                ));
                ui::dim(&format!("  {} (default: {})", option.description, display_default(option.default)));
            }
        }
        ConfigAction::Get { name } => {
            ui::line(&config.get(&name)?);
        }
        ConfigAction::Set { name, value } => {
            config.set(&name, &value)?;
            config.save()?;
            ui::success(&format!("Set {} to {}", name, config.get(&name)?));
        }
        ConfigAction::Reset { name } => {
            config.reset(&name)?;
            config.save()?;
            ui::success(&format!("Reset {} to {}", name, display_default(&config.get(&name)?)));
        }
    }
    Ok(0)
}

fn display_default(value: &str) -> &str {
    if value.is_empty() { "<empty>" } else { value }
}

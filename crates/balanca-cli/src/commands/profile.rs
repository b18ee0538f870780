//! Profile command implementation.

use std::path::Path;

use anyhow::{Context, Result, bail};

use balanca_store::{Profile, Store};

use crate::cli::ProfileAction;

pub fn cmd_profile(db_path: &Path, action: ProfileAction) -> Result<()> {
    let store = Store::open(db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    match action {
        ProfileAction::Set { user, name, height } => {
            if let Some(height) = height
                && !(0.5..=2.5).contains(&height)
            {
                bail!("height {height} m is out of range (expected 0.5-2.5)");
            }
            store.upsert_profile(&Profile {
                user_id: user.clone(),
                display_name: name,
                height_m: height,
            })?;
            println!("Profile for {user} updated.");
        }
        ProfileAction::Show { user } => match store.get_profile(&user)? {
            Some(profile) => {
                println!("User:   {}", profile.user_id);
                println!(
                    "Name:   {}",
                    profile.display_name.as_deref().unwrap_or("-")
                );
                match profile.height_m {
                    Some(height) => println!("Height: {height:.2} m"),
                    None => println!("Height: - (weight history will have no BMI)"),
                }
            }
            None => bail!("no profile for {user}"),
        },
    }

    Ok(())
}

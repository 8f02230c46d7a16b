//! Address lookup commands.

use std::error::Error;

use super::{Context, print_json, say};

/// Best match for a full address.
pub async fn geocode(ctx: &Context, address: &str) -> Result<(), Box<dyn Error>> {
    match ctx.session.api().geocode(address).await? {
        Some(found) => print_json(&found)?,
        None => say("Address not found"),
    }
    Ok(())
}

/// Candidates for a partial address.
pub async fn autocomplete(ctx: &Context, partial: &str) -> Result<(), Box<dyn Error>> {
    let suggestions = ctx.session.api().autocomplete(partial).await?;
    if suggestions.is_empty() {
        say("No suggestions");
    }
    for suggestion in &suggestions {
        say(&format!(
            "{} ({:.5}, {:.5})",
            suggestion.display_name, suggestion.latitude, suggestion.longitude
        ));
    }
    Ok(())
}

//! Account and session commands.
//!
//! The bearer token is written to `CM_TOKEN_FILE` after a successful
//! sign-in and removed on sign-out or when the server rejects it.

use std::error::Error;

use super::{Context, print_json, say};

/// Create an account and sign in.
pub async fn register(
    ctx: &Context,
    email: &str,
    password: &str,
    display_name: &str,
) -> Result<(), Box<dyn Error>> {
    let user = ctx.session.sign_up(email, password, display_name).await?;
    ctx.save_token()?;
    say(&format!("Registered and signed in as {}", user.email));
    Ok(())
}

/// Sign in with email and password.
pub async fn login(ctx: &Context, email: &str, password: &str) -> Result<(), Box<dyn Error>> {
    let user = ctx.session.sign_in(email, password).await?;
    ctx.save_token()?;
    say(&format!("Signed in as {} ({})", user.display_name, user.email));
    Ok(())
}

/// Revoke the token and forget it locally.
pub async fn logout(ctx: &Context) -> Result<(), Box<dyn Error>> {
    let result = ctx.session.sign_out().await;
    ctx.save_token()?;
    result?;
    say("Signed out");
    Ok(())
}

/// Show the signed-in user's profile.
pub async fn profile(ctx: &Context) -> Result<(), Box<dyn Error>> {
    if ctx.session.current_user().is_none() {
        ctx.save_token()?;
        say("Not signed in");
        return Ok(());
    }
    let profile = ctx.session.api().profile().await?;
    print_json(&profile)?;
    Ok(())
}

pub async fn request_password_reset(ctx: &Context, email: &str) -> Result<(), Box<dyn Error>> {
    ctx.session.request_password_reset(email).await?;
    say("If that address has an account, a reset link is on its way");
    Ok(())
}

pub async fn confirm_password_reset(
    ctx: &Context,
    token: &str,
    password: &str,
) -> Result<(), Box<dyn Error>> {
    ctx.session.confirm_password_reset(token, password).await?;
    say("Password updated, sign in with the new password");
    Ok(())
}

//! Example: compile a multipart message and send it over SMTP
//!
//! ## Prerequisites
//!
//! Set environment variables:
//! ```bash
//! export SMTP_HOST="smtp.example.com"
//! export SMTP_USER="sender@example.com"
//! export SMTP_PASS="app-password"
//! export MAIL_TO="recipient@example.com"
//! ```
//!
//! ## Running
//!
//! ```bash
//! RUST_LOG=mailwright_smtp=debug cargo run --example send_mail
//! ```

use std::env;

use anyhow::Context;
use mailwright_mime::{ContentType, MimeTree};
use mailwright_smtp::{Client, Credentials, Envelope, SmtpConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let host = env::var("SMTP_HOST").context("SMTP_HOST environment variable not set")?;
    let user = env::var("SMTP_USER").context("SMTP_USER environment variable not set")?;
    let pass = env::var("SMTP_PASS").context("SMTP_PASS environment variable not set")?;
    let to = env::var("MAIL_TO").context("MAIL_TO environment variable not set")?;

    let mut tree = MimeTree::new(ContentType::multipart_alternative());
    let root = tree.root();
    tree.set_header(root, "From", user.as_str())?;
    tree.set_header(root, "To", to.as_str())?;
    tree.set_header(root, "Subject", "Grüße from mailwright")?;

    let text = tree.create_child(root, ContentType::text_plain())?;
    tree.set_content(text, "Hello!\n\nThis message was streamed over SMTP.\n")?;
    let html = tree.create_child(root, ContentType::text_html())?;
    tree.set_content(html, "<p>Hello!</p><p>This message was streamed over SMTP.</p>")?;

    let envelope = Envelope::try_from(tree.envelope())?;
    let mut message = tree.into_reader();

    let config = SmtpConfig::builder(host)
        .auth(Credentials::plain(user, pass))
        .build();
    let mut client = Client::connect(config).await?;
    println!(
        "Connected to {} (secure: {})",
        client.server_info().hostname,
        client.is_secure()
    );

    let info = client.send(&envelope, &mut message).await?;
    println!("Accepted: {:?}", info.accepted);
    println!("Rejected: {:?}", info.rejected);
    println!("Server: {}", info.response);
    println!(
        "Sent {} bytes (envelope {:?}, data {:?})",
        info.message_size, info.envelope_time, info.message_time
    );

    client.quit().await?;
    Ok(())
}

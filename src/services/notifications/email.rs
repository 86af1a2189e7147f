use anyhow::Context;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{Notification, NotificationSender};

pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(
        host: &str,
        username: String,
        password: String,
        from: &str,
    ) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .context("invalid SMTP relay host")?
            .credentials(Credentials::new(username, password))
            .build();
        let from = from.parse::<Mailbox>().context("invalid sender address")?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl NotificationSender for SmtpEmailSender {
    async fn send(&self, note: &Notification) -> anyhow::Result<()> {
        let to = note
            .recipient_email
            .parse::<Mailbox>()
            .context("invalid recipient address")?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(note.title.clone())
            .body(note.body.clone())
            .context("failed to build email")?;

        self.transport
            .send(message)
            .await
            .context("failed to send email")?;

        Ok(())
    }
}

use async_trait::async_trait;
use model::{Appointment, Error, MailConfig};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Outgoing-mail seam. The booking facade only depends on this trait, so
/// tests substitute a recording double for the real API client.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), Error>;
}

/// Client for a Resend-style transactional mail HTTP API.
#[derive(Debug, Clone)]
pub struct Mailer {
    http: reqwest::Client,
    config: MailConfig,
}

impl Mailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentPayload<'a>>,
}

#[derive(Serialize)]
struct AttachmentPayload<'a> {
    filename: &'a str,
    content: String,
}

#[async_trait]
impl Notifier for Mailer {
    async fn send(&self, message: &Message) -> Result<(), Error> {
        let attachments = message
            .attachment
            .iter()
            .map(|a| AttachmentPayload {
                filename: &a.filename,
                content: base64::encode(&a.content),
            })
            .collect();
        let request = SendEmailRequest {
            from: &self.config.sender,
            to: [message.to.as_str()],
            subject: &message.subject,
            html: &message.html,
            attachments,
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Notification(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "mail API returned {}: {}",
                status, body
            )));
        }
        debug!(to = %message.to, "mail sent");
        Ok(())
    }
}

/// Confirmation body sent to the client.
pub fn confirmation_html(appointment: &Appointment) -> String {
    format!(
        "<h1>Your appointment is booked</h1>\
         <p>Hi {name},</p>\
         <p>Your <strong>{service}</strong> session is scheduled for \
         <strong>{date}</strong> at <strong>{time}</strong>.</p>\
         <p>See you soon.</p>",
        name = appointment.name,
        service = appointment.service,
        date = appointment.date,
        time = appointment.time,
    )
}

/// Internal notification body sent to the practice inbox.
pub fn admin_notification_html(appointment: &Appointment, calendar_url: &str) -> String {
    let message = appointment.message.as_deref().unwrap_or("-");
    format!(
        "<h1>New appointment booked</h1>\
         <ul>\
         <li>Name: {name}</li>\
         <li>Email: {email}</li>\
         <li>Phone: {phone}</li>\
         <li>Service: {service}</li>\
         <li>Date: {date} {time}</li>\
         <li>Message: {message}</li>\
         </ul>\
         <p><a href=\"{calendar_url}\">Add to Google Calendar</a></p>",
        name = appointment.name,
        email = appointment.email,
        phone = appointment.phone,
        service = appointment.service,
        date = appointment.date,
        time = appointment.time,
        message = message,
        calendar_url = calendar_url,
    )
}

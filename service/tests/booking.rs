use std::sync::Mutex;

use async_trait::async_trait;
use booking_service::{BookingService, Message, Notifier};
use chrono::NaiveDate;
use model::{Appointment, AppointmentStatus, Config, Error, NewAppointment, TimeOfDay, SERVICES};
use scheduling::{Appointments, MemStore, SchedulingManager};

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Message>>,
    failing: bool,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    fn messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for &RecordingNotifier {
    async fn send(&self, message: &Message) -> Result<(), Error> {
        if self.failing {
            return Err(Error::Notification("mail API unreachable".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

fn request(date: NaiveDate, time: &str) -> NewAppointment {
    NewAppointment {
        name: "Alice".into(),
        email: "alice@example.com".into(),
        phone: "5512345678".into(),
        date,
        time: TimeOfDay::parse(time).unwrap(),
        service: SERVICES[0].into(),
        message: Some("first session".into()),
    }
}

fn service(notifier: &RecordingNotifier) -> BookingService<MemStore, &RecordingNotifier> {
    BookingService::new(
        SchedulingManager::new(MemStore::new()),
        notifier,
        "admin@example.com",
    )
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn booking_sends_confirmation_and_admin_notification() {
    let notifier = RecordingNotifier::default();
    let service = service(&notifier);

    let outcome = service.book(request(date(2025, 3, 5), "10:00")).await.unwrap();
    assert!(outcome.notified);
    assert_eq!(outcome.appointment.status, AppointmentStatus::Pending);

    let messages = notifier.messages();
    assert_eq!(messages.len(), 2);

    let confirmation = &messages[0];
    assert_eq!(confirmation.to, "alice@example.com");
    assert!(confirmation.attachment.is_none());
    assert!(confirmation.html.contains("Individual therapy"));

    let notification = &messages[1];
    assert_eq!(notification.to, "admin@example.com");
    assert!(notification.html.contains("google.com/calendar/render"));
    let ics = notification.attachment.as_ref().unwrap();
    assert_eq!(ics.filename, "appointment.ics");
    let body = String::from_utf8(ics.content.clone()).unwrap();
    assert!(body.contains("BEGIN:VCALENDAR"));
    assert!(body.contains("DTSTART:20250305T100000Z"));
}

#[tokio::test]
async fn mail_failure_keeps_the_booking() {
    let notifier = RecordingNotifier::failing();
    let service = service(&notifier);

    let outcome = service.book(request(date(2025, 3, 5), "10:00")).await.unwrap();
    assert!(!outcome.notified);

    let saved: Appointment = service
        .manager()
        .get_appointment(outcome.appointment.id)
        .await
        .unwrap();
    assert_eq!(saved, outcome.appointment);
}

#[tokio::test]
async fn public_booking_rejects_a_taken_slot() {
    let notifier = RecordingNotifier::default();
    let service = service(&notifier);

    service.book(request(date(2025, 3, 5), "10:00")).await.unwrap();
    let err = service
        .book(request(date(2025, 3, 5), "10:00"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    // only the first booking's mails went out
    assert_eq!(notifier.messages().len(), 2);
}

#[tokio::test]
async fn available_slots_exclude_booked_times() {
    let notifier = RecordingNotifier::default();
    let service = service(&notifier);

    service.book(request(date(2025, 3, 5), "11:00")).await.unwrap();
    let slots = service.available_slots(date(2025, 3, 5)).await.unwrap();
    assert_eq!(slots.len(), 7);
    assert!(!slots.contains(&TimeOfDay::parse("11:00").unwrap()));
}

#[test]
fn fixture_config_loads() {
    let config = Config::load("fixtures/config.yml").unwrap();
    assert_eq!(config.db.dbname, "bookings");
    assert_eq!(config.mail.admin, "admin@example.com");
}

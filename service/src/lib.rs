mod calendar;
mod notify;

use chrono::NaiveDate;
use model::{Appointment, Error, NewAppointment, TimeOfDay, TIME_SLOTS};
use scheduling::{Appointments, BookingStore, SchedulingManager};
use tracing::warn;

pub use calendar::{google_calendar_link, to_ics, CalendarEvent};
pub use notify::{
    admin_notification_html, confirmation_html, Attachment, Mailer, Message, Notifier,
};

/// Public booking facade: persists the appointment, then sends the client
/// confirmation and the internal notification.
///
/// Mail failure never rolls back the booking; it is logged and reported in
/// the outcome instead.
pub struct BookingService<S, N> {
    manager: SchedulingManager<S>,
    notifier: N,
    admin_email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingOutcome {
    pub appointment: Appointment,
    pub notified: bool,
}

impl<S: BookingStore, N: Notifier> BookingService<S, N> {
    pub fn new(
        manager: SchedulingManager<S>,
        notifier: N,
        admin_email: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            notifier,
            admin_email: admin_email.into(),
        }
    }

    pub fn manager(&self) -> &SchedulingManager<S> {
        &self.manager
    }

    pub async fn book(&self, request: NewAppointment) -> Result<BookingOutcome, Error> {
        let appointment = self.manager.create_appointment(request).await?;
        let notified = match self.send_booking_mails(&appointment).await {
            Ok(()) => true,
            Err(e) => {
                warn!(appointment_id = %appointment.id, %e, "booking saved but notification failed");
                false
            }
        };
        Ok(BookingOutcome {
            appointment,
            notified,
        })
    }

    /// Bookable time slots still free on `date`.
    pub async fn available_slots(&self, date: NaiveDate) -> Result<Vec<TimeOfDay>, Error> {
        let booked = self.manager.booked_times(date).await?;
        let mut slots = Vec::new();
        for value in TIME_SLOTS {
            let slot = TimeOfDay::parse(value)?;
            if !booked.contains(&slot) {
                slots.push(slot);
            }
        }
        Ok(slots)
    }

    async fn send_booking_mails(&self, appointment: &Appointment) -> Result<(), Error> {
        let event =
            CalendarEvent::for_session(&appointment.service, appointment.date, appointment.time);
        let calendar_url = google_calendar_link(&appointment.email, &event);
        let ics = to_ics(&event);

        self.notifier
            .send(&Message {
                to: appointment.email.clone(),
                subject: "Your appointment is booked".into(),
                html: confirmation_html(appointment),
                attachment: None,
            })
            .await?;
        self.notifier
            .send(&Message {
                to: self.admin_email.clone(),
                subject: "New appointment booked".into(),
                html: admin_notification_html(appointment, &calendar_url),
                attachment: Some(Attachment {
                    filename: "appointment.ics".into(),
                    content: ics.into_bytes(),
                }),
            })
            .await
    }
}

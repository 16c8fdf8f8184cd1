use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use model::TimeOfDay;

const SESSION_LENGTH_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarEvent {
    /// One-hour session for a booked appointment.
    pub fn for_session(service: &str, date: NaiveDate, time: TimeOfDay) -> Self {
        let start = Utc.from_utc_datetime(&date.and_time(time.as_naive()));
        CalendarEvent {
            title: format!("Appointment: {}", service),
            description: Some(
                "Thank you for booking your appointment. See you soon.".to_string(),
            ),
            location: None,
            start,
            end: start + Duration::minutes(SESSION_LENGTH_MINUTES),
        }
    }
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Render a minimal single-event iCalendar payload, CRLF-terminated lines.
pub fn to_ics(event: &CalendarEvent) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("DTSTART:{}", timestamp(event.start)),
        format!("DTEND:{}", timestamp(event.end)),
        format!("SUMMARY:{}", event.title),
    ];
    if let Some(description) = &event.description {
        lines.push(format!("DESCRIPTION:{}", description));
    }
    if let Some(location) = &event.location {
        lines.push(format!("LOCATION:{}", location));
    }
    lines.push("END:VEVENT".to_string());
    lines.push("END:VCALENDAR".to_string());
    lines.join("\r\n")
}

/// Deep link that pre-fills the event in Google Calendar, with the client
/// added as an attendee.
pub fn google_calendar_link(attendee: &str, event: &CalendarEvent) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("action", "TEMPLATE")
        .append_pair("text", &event.title)
        .append_pair(
            "details",
            event.description.as_deref().unwrap_or_default(),
        )
        .append_pair(
            "dates",
            &format!("{}/{}", timestamp(event.start), timestamp(event.end)),
        )
        .append_pair("add", attendee)
        .finish();
    format!("https://www.google.com/calendar/render?{}", query)
}

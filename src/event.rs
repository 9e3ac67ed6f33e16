//! The in-memory calendar event model

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DavError, DavResult};

/// RFC 5545 STATUS values for events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Tentative,
    Confirmed,
    Cancelled,
}

impl EventStatus {
    pub fn as_ical(&self) -> &'static str {
        match self {
            Self::Tentative => "TENTATIVE",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn from_ical(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "TENTATIVE" => Some(Self::Tentative),
            "CONFIRMED" => Some(Self::Confirmed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Whether the event blocks time in free-busy computations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transparency {
    Opaque,
    Transparent,
}

impl Default for Transparency {
    fn default() -> Self {
        Self::Opaque
    }
}

/// A point in time, in one of the four shapes iCalendar allows
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EventTime {
    /// A date without a time (all-day events)
    Date(NaiveDate),
    /// An instant in UTC (`...T...Z` on the wire)
    Utc(DateTime<Utc>),
    /// A local time in a named zone (`TZID=...` on the wire)
    Zoned { local: NaiveDateTime, tzid: String },
    /// A local time bound to no zone at all
    Floating(NaiveDateTime),
}

impl EventTime {
    pub fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// The two times are of comparable shapes (same kind, or same zone)
    fn comparable_with(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Date(_), Self::Date(_)) => true,
            (Self::Utc(_), Self::Utc(_)) => true,
            (Self::Floating(_), Self::Floating(_)) => true,
            (Self::Zoned { tzid: a, .. }, Self::Zoned { tzid: b, .. }) => a == b,
            _ => false,
        }
    }

    /// Ordering check, only meaningful when [`Self::comparable_with`] holds
    fn is_before_or_equal(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Date(a), Self::Date(b)) => a <= b,
            (Self::Utc(a), Self::Utc(b)) => a <= b,
            (Self::Floating(a), Self::Floating(b)) => a <= b,
            (Self::Zoned { local: a, .. }, Self::Zoned { local: b, .. }) => a <= b,
            _ => true,
        }
    }
}

/// Where a timed event ends: an explicit end point or a duration.
///
/// Exactly one of the two is the source of truth; an event never carries both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EventEnd {
    Until(EventTime),
    /// An RFC 5545 DURATION value, kept as text so it round-trips unaltered
    Duration(String),
}

/// A VALARM, kept close to its wire shape so it round-trips
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    /// DISPLAY, AUDIO or EMAIL
    pub action: String,
    /// The TRIGGER value, verbatim (e.g. `-PT15M`)
    pub trigger: String,
    pub description: Option<String>,
}

/// An ORGANIZER property
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Organizer {
    /// Usually a `mailto:` URI
    pub cal_address: String,
    pub common_name: Option<String>,
}

/// An ATTENDEE property
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub cal_address: String,
    pub common_name: Option<String>,
    /// PARTSTAT parameter, verbatim
    pub participation_status: Option<String>,
    /// ROLE parameter, verbatim
    pub role: Option<String>,
}

/// A property this model does not interpret, preserved for round-tripping
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtensionProp {
    pub name: String,
    pub value: Option<String>,
    pub params: Vec<(String, Vec<String>)>,
}

/// A calendar event.
///
/// Identified by a stable `uid` that never changes once the event exists.
/// Mutating setters update `last_modified`; [`Event::bump_sequence`] records
/// that a revision meaningful to other attendees happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    uid: String,
    summary: String,
    description: Option<String>,
    location: Option<String>,
    status: Option<EventStatus>,
    transparency: Transparency,
    sequence: u32,

    dtstart: EventTime,
    end: EventEnd,

    /// RRULE text, verbatim; this crate round-trips recurrence rules but does not expand them
    rrule: Option<String>,
    exdates: Vec<EventTime>,
    /// Set on recurrence override instances
    recurrence_id: Option<EventTime>,

    alarms: Vec<Alarm>,
    categories: Vec<String>,
    organizer: Option<Organizer>,
    attendees: Vec<Attendee>,
    color: Option<String>,

    dtstamp: DateTime<Utc>,
    last_modified: Option<DateTime<Utc>>,
    created: Option<DateTime<Utc>>,
    url: Option<String>,

    /// Properties we do not interpret (X-..., vendor extensions). Kept so that
    /// an edit-and-save cycle does not destroy what other clients stored
    extra_properties: Vec<ExtensionProp>,
}

impl Event {
    /// Create a new event.
    ///
    /// Returns an [`DavError::Argument`] error when the endpoints are inconsistent:
    /// a date-only start with a timed end (or vice versa), or an end before the start.
    pub fn new(
        uid: String,
        summary: String,
        dtstart: EventTime,
        end: EventEnd,
        dtstamp: DateTime<Utc>,
    ) -> DavResult<Self> {
        if uid.is_empty() {
            return Err(DavError::argument("event uid must not be empty"));
        }
        Self::check_endpoints(&dtstart, &end)?;

        Ok(Self {
            uid,
            summary,
            description: None,
            location: None,
            status: None,
            transparency: Transparency::default(),
            sequence: 0,
            dtstart,
            end,
            rrule: None,
            exdates: Vec::new(),
            recurrence_id: None,
            alarms: Vec::new(),
            categories: Vec::new(),
            organizer: None,
            attendees: Vec::new(),
            color: None,
            dtstamp,
            last_modified: None,
            created: None,
            url: None,
            extra_properties: Vec::new(),
        })
    }

    fn check_endpoints(dtstart: &EventTime, end: &EventEnd) -> DavResult<()> {
        if let EventEnd::Until(until) = end {
            if dtstart.is_date() != until.is_date() {
                return Err(DavError::argument(
                    "dtstart and dtend must both be dates, or both be date-times",
                ));
            }
            if dtstart.comparable_with(until) && !dtstart.is_before_or_equal(until) {
                return Err(DavError::argument("dtend must not be before dtstart"));
            }
        }
        Ok(())
    }

    pub fn uid(&self) -> &str { &self.uid }
    pub fn summary(&self) -> &str { &self.summary }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }
    pub fn location(&self) -> Option<&str> { self.location.as_deref() }
    pub fn status(&self) -> Option<EventStatus> { self.status }
    pub fn transparency(&self) -> Transparency { self.transparency }
    pub fn sequence(&self) -> u32 { self.sequence }
    pub fn dtstart(&self) -> &EventTime { &self.dtstart }
    pub fn end(&self) -> &EventEnd { &self.end }
    pub fn rrule(&self) -> Option<&str> { self.rrule.as_deref() }
    pub fn exdates(&self) -> &[EventTime] { &self.exdates }
    pub fn recurrence_id(&self) -> Option<&EventTime> { self.recurrence_id.as_ref() }
    pub fn alarms(&self) -> &[Alarm] { &self.alarms }
    pub fn categories(&self) -> &[String] { &self.categories }
    pub fn organizer(&self) -> Option<&Organizer> { self.organizer.as_ref() }
    pub fn attendees(&self) -> &[Attendee] { &self.attendees }
    pub fn color(&self) -> Option<&str> { self.color.as_deref() }
    pub fn dtstamp(&self) -> DateTime<Utc> { self.dtstamp }
    pub fn last_modified(&self) -> Option<DateTime<Utc>> { self.last_modified }
    pub fn created(&self) -> Option<DateTime<Utc>> { self.created }
    pub fn url(&self) -> Option<&str> { self.url.as_deref() }
    pub fn extra_properties(&self) -> &[ExtensionProp] { &self.extra_properties }

    /// Whether this is an all-day event (date-only endpoints)
    pub fn is_all_day(&self) -> bool {
        self.dtstart.is_date()
    }

    /// The most recent of `dtstamp` and `last_modified`; what "newest" means
    /// when two copies of the same event compete
    pub fn revision_stamp(&self) -> DateTime<Utc> {
        match self.last_modified {
            Some(lm) if lm > self.dtstamp => lm,
            _ => self.dtstamp,
        }
    }

    fn touch(&mut self) {
        self.last_modified = Some(Utc::now());
    }

    pub fn set_summary(&mut self, summary: String) {
        self.summary = summary;
        self.touch();
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.touch();
    }

    pub fn set_location(&mut self, location: Option<String>) {
        self.location = location;
        self.touch();
    }

    pub fn set_status(&mut self, status: Option<EventStatus>) {
        self.status = status;
        self.touch();
    }

    pub fn set_transparency(&mut self, transparency: Transparency) {
        self.transparency = transparency;
        self.touch();
    }

    /// Replace the endpoints, re-checking their consistency
    pub fn set_times(&mut self, dtstart: EventTime, end: EventEnd) -> DavResult<()> {
        Self::check_endpoints(&dtstart, &end)?;
        self.dtstart = dtstart;
        self.end = end;
        self.touch();
        Ok(())
    }

    pub fn set_rrule(&mut self, rrule: Option<String>) {
        self.rrule = rrule;
        self.touch();
    }

    pub fn set_exdates(&mut self, exdates: Vec<EventTime>) {
        self.exdates = exdates;
        self.touch();
    }

    pub fn set_recurrence_id(&mut self, recurrence_id: Option<EventTime>) {
        self.recurrence_id = recurrence_id;
    }

    pub fn set_alarms(&mut self, alarms: Vec<Alarm>) {
        self.alarms = alarms;
        self.touch();
    }

    pub fn set_categories(&mut self, categories: Vec<String>) {
        self.categories = categories;
        self.touch();
    }

    pub fn set_organizer(&mut self, organizer: Option<Organizer>) {
        self.organizer = organizer;
        self.touch();
    }

    pub fn set_attendees(&mut self, attendees: Vec<Attendee>) {
        self.attendees = attendees;
        self.touch();
    }

    pub fn set_color(&mut self, color: Option<String>) {
        self.color = color;
        self.touch();
    }

    pub fn set_url(&mut self, url: Option<String>) {
        self.url = url;
        self.touch();
    }

    pub fn set_dtstamp(&mut self, dtstamp: DateTime<Utc>) {
        self.dtstamp = dtstamp;
    }

    pub fn set_created(&mut self, created: Option<DateTime<Utc>>) {
        self.created = created;
    }

    pub fn set_last_modified(&mut self, last_modified: Option<DateTime<Utc>>) {
        self.last_modified = last_modified;
    }

    pub fn add_extra_property(&mut self, prop: ExtensionProp) {
        self.extra_properties.push(prop);
    }

    /// Record a new revision of this event.
    ///
    /// The sequence only ever grows for a given uid; a fresh create starts over at 0.
    pub fn bump_sequence(&mut self) {
        self.sequence += 1;
        self.touch();
    }

    /// Restore a sequence number read from the wire. Fails when it would make
    /// the local sequence go backwards
    pub fn set_sequence(&mut self, sequence: u32) -> DavResult<()> {
        if sequence < self.sequence {
            return Err(DavError::argument(format!(
                "sequence must not decrease ({} -> {})",
                self.sequence, sequence
            )));
        }
        self.sequence = sequence;
        Ok(())
    }

    /// Restore a sequence from parsed data without monotonicity checks.
    /// Only the codec should use this: the wire is the source of truth there
    pub(crate) fn force_sequence(&mut self, sequence: u32) {
        self.sequence = sequence;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dt(s: &str) -> DateTime<Utc> {
        let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap();
        DateTime::from_naive_utc_and_offset(naive, Utc)
    }

    fn timed_event() -> Event {
        Event::new(
            "uid-1".into(),
            "Stand-up".into(),
            EventTime::Utc(dt("2023-05-02 09:00:00")),
            EventEnd::Until(EventTime::Utc(dt("2023-05-02 09:15:00"))),
            dt("2023-05-01 08:00:00"),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_consistency() {
        // end before start
        let bad = Event::new(
            "uid-1".into(),
            "Backwards".into(),
            EventTime::Utc(dt("2023-05-02 10:00:00")),
            EventEnd::Until(EventTime::Utc(dt("2023-05-02 09:00:00"))),
            dt("2023-05-01 08:00:00"),
        );
        assert!(matches!(bad, Err(DavError::Argument { .. })));

        // date start with timed end
        let mixed = Event::new(
            "uid-2".into(),
            "Mixed".into(),
            EventTime::Date(NaiveDate::from_ymd_opt(2023, 5, 2).unwrap()),
            EventEnd::Until(EventTime::Utc(dt("2023-05-03 00:00:00"))),
            dt("2023-05-01 08:00:00"),
        );
        assert!(matches!(mixed, Err(DavError::Argument { .. })));

        // duration instead of an end point is always fine
        let dur = Event::new(
            "uid-3".into(),
            "With duration".into(),
            EventTime::Utc(dt("2023-05-02 10:00:00")),
            EventEnd::Duration("PT1H".into()),
            dt("2023-05-01 08:00:00"),
        );
        assert!(dur.is_ok());
    }

    #[test]
    fn test_all_day_derivation() {
        let start = NaiveDate::from_ymd_opt(2023, 5, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2023, 5, 3).unwrap();
        let event = Event::new(
            "uid-4".into(),
            "Holiday".into(),
            EventTime::Date(start),
            EventEnd::Until(EventTime::Date(end)),
            dt("2023-05-01 08:00:00"),
        )
        .unwrap();
        assert!(event.is_all_day());
        assert!(!timed_event().is_all_day());
    }

    #[test]
    fn test_sequence_monotonicity() {
        let mut event = timed_event();
        assert_eq!(event.sequence(), 0);
        event.bump_sequence();
        event.bump_sequence();
        assert_eq!(event.sequence(), 2);

        assert!(event.set_sequence(1).is_err());
        assert_eq!(event.sequence(), 2);
        assert!(event.set_sequence(5).is_ok());
        assert_eq!(event.sequence(), 5);
    }

    #[test]
    fn test_setters_update_last_modified() {
        let mut event = timed_event();
        assert!(event.last_modified().is_none());
        event.set_summary("Stand-up (moved)".into());
        assert!(event.last_modified().is_some());
    }

    #[test]
    fn test_revision_stamp_prefers_latest() {
        let mut event = timed_event();
        assert_eq!(event.revision_stamp(), event.dtstamp());

        event.set_last_modified(Some(dt("2023-06-01 00:00:00")));
        assert_eq!(event.revision_stamp(), dt("2023-06-01 00:00:00"));

        // a stale last-modified does not go backwards
        event.set_last_modified(Some(dt("2020-01-01 00:00:00")));
        assert_eq!(event.revision_stamp(), event.dtstamp());
    }
}

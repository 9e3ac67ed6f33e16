//! A module to build iCalendar files

use chrono::{DateTime, Utc};
use ics::components::{Parameter as IcsParameter, Property as IcsProperty};
use ics::properties::{Description, Status, Summary, Trigger};
use ics::{escape_text, Alarm as IcsAlarm, Event as IcsEvent, ICalendar};

use crate::config::{ORG_NAME, PRODUCT_NAME};
use crate::error::DavResult;
use crate::event::{Alarm, Event, EventEnd, EventStatus, EventTime, ExtensionProp, Transparency};

/// Create an iCalendar text from an [`Event`]
pub fn build_from(event: &Event) -> DavResult<String> {
    let mut ics_event = IcsEvent::new(event.uid().to_string(), format_utc(event.dtstamp()));

    ics_event.push(IcsProperty::new("SUMMARY", escape_text(event.summary().to_string())));

    if let Some(description) = event.description() {
        ics_event.push(IcsProperty::new("DESCRIPTION", escape_text(description.to_string())));
    }
    if let Some(location) = event.location() {
        ics_event.push(IcsProperty::new("LOCATION", escape_text(location.to_string())));
    }
    if let Some(status) = event.status() {
        ics_event.push(match status {
            EventStatus::Tentative => Status::tentative(),
            EventStatus::Confirmed => Status::confirmed(),
            EventStatus::Cancelled => Status::cancelled(),
        });
    }
    // OPAQUE is the default, only the deviation is written out
    if event.transparency() == Transparency::Transparent {
        ics_event.push(IcsProperty::new("TRANSP", "TRANSPARENT"));
    }
    if event.sequence() > 0 {
        ics_event.push(IcsProperty::new("SEQUENCE", event.sequence().to_string()));
    }

    ics_event.push(time_property("DTSTART", event.dtstart()));
    match event.end() {
        EventEnd::Until(until) => ics_event.push(time_property("DTEND", until)),
        EventEnd::Duration(duration) => {
            ics_event.push(IcsProperty::new("DURATION", duration.to_string()))
        }
    }

    if let Some(rrule) = event.rrule() {
        ics_event.push(IcsProperty::new("RRULE", rrule.to_string()));
    }
    for exdate in event.exdates() {
        ics_event.push(time_property("EXDATE", exdate));
    }
    if let Some(recurrence_id) = event.recurrence_id() {
        ics_event.push(time_property("RECURRENCE-ID", recurrence_id));
    }

    if !event.categories().is_empty() {
        let joined = event
            .categories()
            .iter()
            .map(|category| escape_text(category.to_string()).to_string())
            .collect::<Vec<_>>()
            .join(",");
        ics_event.push(IcsProperty::new("CATEGORIES", joined));
    }

    if let Some(organizer) = event.organizer() {
        let mut prop = IcsProperty::new("ORGANIZER", organizer.cal_address.to_string());
        if let Some(common_name) = &organizer.common_name {
            prop.add(IcsParameter::new("CN", common_name.to_string()));
        }
        ics_event.push(prop);
    }
    for attendee in event.attendees() {
        let mut prop = IcsProperty::new("ATTENDEE", attendee.cal_address.to_string());
        if let Some(common_name) = &attendee.common_name {
            prop.add(IcsParameter::new("CN", common_name.to_string()));
        }
        if let Some(partstat) = &attendee.participation_status {
            prop.add(IcsParameter::new("PARTSTAT", partstat.to_string()));
        }
        if let Some(role) = &attendee.role {
            prop.add(IcsParameter::new("ROLE", role.to_string()));
        }
        ics_event.push(prop);
    }

    if let Some(color) = event.color() {
        ics_event.push(IcsProperty::new("COLOR", color.to_string()));
    }
    if let Some(url) = event.url() {
        ics_event.push(IcsProperty::new("URL", url.to_string()));
    }
    if let Some(created) = event.created() {
        ics_event.push(IcsProperty::new("CREATED", format_utc(created)));
    }
    if let Some(last_modified) = event.last_modified() {
        ics_event.push(IcsProperty::new("LAST-MODIFIED", format_utc(last_modified)));
    }

    // Also add the fields we have not interpreted
    for extra in event.extra_properties() {
        ics_event.push(extension_to_ics_property(extra));
    }

    for alarm in event.alarms() {
        ics_event.add_alarm(alarm_to_ics(alarm, event.summary()));
    }

    let prod_id = format!("-//{}//{}//EN", *ORG_NAME, *PRODUCT_NAME);
    let mut calendar = ICalendar::new("2.0", prod_id);
    calendar.add_event(ics_event);

    Ok(calendar.to_string())
}

fn format_utc(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%SZ").to_string()
}

fn time_property(name: &str, time: &EventTime) -> IcsProperty<'static> {
    match time {
        EventTime::Date(date) => {
            let mut prop = IcsProperty::new(name.to_string(), date.format("%Y%m%d").to_string());
            prop.add(IcsParameter::new("VALUE", "DATE"));
            prop
        }
        EventTime::Utc(instant) => {
            IcsProperty::new(name.to_string(), instant.format("%Y%m%dT%H%M%SZ").to_string())
        }
        EventTime::Zoned { local, tzid } => {
            let mut prop =
                IcsProperty::new(name.to_string(), local.format("%Y%m%dT%H%M%S").to_string());
            prop.add(IcsParameter::new("TZID", tzid.to_string()));
            prop
        }
        EventTime::Floating(local) => {
            IcsProperty::new(name.to_string(), local.format("%Y%m%dT%H%M%S").to_string())
        }
    }
}

fn alarm_to_ics(alarm: &Alarm, fallback_summary: &str) -> IcsAlarm<'static> {
    let trigger = Trigger::new(alarm.trigger.to_string());
    let description = Description::new(escape_text(
        alarm.description.clone().unwrap_or_else(|| fallback_summary.to_string()),
    ));
    match alarm.action.to_ascii_uppercase().as_str() {
        "AUDIO" => IcsAlarm::audio(trigger),
        "EMAIL" => IcsAlarm::email(
            trigger,
            description,
            Summary::new(escape_text(fallback_summary.to_string())),
        ),
        _ => IcsAlarm::display(trigger, description),
    }
}

fn extension_to_ics_property(extra: &ExtensionProp) -> IcsProperty<'static> {
    let mut prop = match &extra.value {
        Some(value) => IcsProperty::new(extra.name.to_string(), value.to_string()),
        None => IcsProperty::new(extra.name.to_string(), ""),
    };
    for (name, values) in &extra.params {
        prop.add(IcsParameter::new(name.to_string(), values.join(";")));
    }
    prop
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ical::parse;
    use chrono::{NaiveDate, TimeZone};

    fn sample_event() -> Event {
        let start = EventTime::Utc(Utc.with_ymd_and_hms(2023, 4, 5, 14, 0, 0).unwrap());
        let end = EventEnd::Until(EventTime::Utc(Utc.with_ymd_and_hms(2023, 4, 5, 15, 0, 0).unwrap()));
        let dtstamp = Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 0).unwrap();
        let mut event =
            Event::new("builder-test-1".into(), "Planning, part two".into(), start, end, dtstamp)
                .unwrap();
        event.set_description(Some("Line one\nline two".into()));
        event.set_location(Some("Room 12; annex".into()));
        event.set_status(Some(EventStatus::Confirmed));
        event.set_categories(vec!["work".into(), "planning".into()]);
        event.set_alarms(vec![Alarm {
            action: "DISPLAY".into(),
            trigger: "-PT10M".into(),
            description: Some("Planning".into()),
        }]);
        event.add_extra_property(ExtensionProp {
            name: "X-CUSTOM-FLAG".into(),
            value: Some("kept".into()),
            params: vec![("X-SCOPE".into(), vec!["test".into()])],
        });
        event.set_last_modified(Some(dtstamp));
        event
    }

    #[test]
    fn test_built_ical_shape() {
        let ical_text = build_from(&sample_event()).unwrap();

        assert!(ical_text.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ical_text.contains("BEGIN:VEVENT\r\n"));
        assert!(ical_text.contains("UID:builder-test-1\r\n"));
        assert!(ical_text.contains("DTSTART:20230405T140000Z\r\n"));
        assert!(ical_text.contains("DTEND:20230405T150000Z\r\n"));
        assert!(ical_text.contains("SUMMARY:Planning\\, part two\r\n"));
        assert!(ical_text.contains("STATUS:CONFIRMED\r\n"));
        assert!(ical_text.contains("BEGIN:VALARM\r\n"));
        assert!(ical_text.contains("X-CUSTOM-FLAG;X-SCOPE=test:kept\r\n"));
        assert!(ical_text.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn test_roundtrip_preserves_fields() {
        let original = sample_event();
        let ical_text = build_from(&original).unwrap();
        let reparsed = parse(&ical_text).unwrap();
        assert_eq!(reparsed.len(), 1);
        let reparsed = &reparsed[0];

        assert_eq!(reparsed.uid(), original.uid());
        assert_eq!(reparsed.summary(), original.summary());
        assert_eq!(reparsed.description(), original.description());
        assert_eq!(reparsed.location(), original.location());
        assert_eq!(reparsed.status(), original.status());
        assert_eq!(reparsed.dtstart(), original.dtstart());
        assert_eq!(reparsed.end(), original.end());
        assert_eq!(reparsed.categories(), original.categories());
        assert_eq!(reparsed.alarms(), original.alarms());
        assert_eq!(reparsed.extra_properties(), original.extra_properties());
        assert_eq!(reparsed.last_modified(), original.last_modified());
    }

    #[test]
    fn test_all_day_event_uses_date_values() {
        let start = EventTime::Date(NaiveDate::from_ymd_opt(2023, 5, 1).unwrap());
        let end = EventEnd::Until(EventTime::Date(NaiveDate::from_ymd_opt(2023, 5, 2).unwrap()));
        let dtstamp = Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 0).unwrap();
        let event = Event::new("all-day".into(), "Holiday".into(), start, end, dtstamp).unwrap();

        let ical_text = build_from(&event).unwrap();
        assert!(ical_text.contains("DTSTART;VALUE=DATE:20230501\r\n"));
        assert!(ical_text.contains("DTEND;VALUE=DATE:20230502\r\n"));
    }
}

//! A module to parse iCalendar files

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ical::parser::ical::component::{IcalAlarm, IcalEvent};
use ical::property::Property;

use crate::error::{DavError, DavResult};
use crate::event::{
    Alarm, Attendee, Event, EventEnd, EventStatus, EventTime, ExtensionProp, Organizer,
    Transparency,
};

/// Property names this model interprets; everything else is preserved verbatim
const HANDLED_PROPERTIES: &[&str] = &[
    "UID", "SUMMARY", "DESCRIPTION", "LOCATION", "STATUS", "TRANSP", "SEQUENCE", "DTSTART",
    "DTEND", "DURATION", "RRULE", "EXDATE", "RECURRENCE-ID", "CATEGORIES", "ORGANIZER",
    "ATTENDEE", "COLOR", "DTSTAMP", "LAST-MODIFIED", "CREATED", "URL",
];

/// Parse an iCalendar text into the events it contains.
///
/// A single VCALENDAR may hold several VEVENTs sharing a uid (a recurring
/// event and its overrides); all of them are returned. Multiple VCALENDARs in
/// one text are rejected, as CalDAV stores exactly one per resource.
pub fn parse(content: &str) -> DavResult<Vec<Event>> {
    let mut reader = ical::IcalParser::new(content.as_bytes());

    let calendar = match reader.next() {
        None => return Err(DavError::parse("no calendar in iCal data")),
        Some(Err(err)) => return Err(DavError::parse(format!("invalid iCal data: {}", err))),
        Some(Ok(calendar)) => calendar,
    };

    if reader.next().map(|r| r.is_ok()) == Some(true) {
        return Err(DavError::parse("multiple calendars in a single resource are not supported"));
    }

    if calendar.events.is_empty() {
        return Err(DavError::parse("no VEVENT in iCal data"));
    }

    calendar.events.iter().map(event_from_ical).collect()
}

fn event_from_ical(ical_event: &IcalEvent) -> DavResult<Event> {
    let props = &ical_event.properties;

    let uid = prop_value(props, "UID")
        .ok_or_else(|| DavError::parse("VEVENT without a UID"))?
        .to_string();

    let summary = prop_value(props, "SUMMARY").map(unescape_text).unwrap_or_default();

    let dtstart_prop = prop(props, "DTSTART")
        .ok_or_else(|| DavError::parse(format!("event {} has no DTSTART", uid)))?;
    let dtstart = parse_time(dtstart_prop)?;

    let end = match (prop(props, "DTEND"), prop_value(props, "DURATION")) {
        (Some(dtend), _) => EventEnd::Until(parse_time(dtend)?),
        (None, Some(duration)) => EventEnd::Duration(duration.to_string()),
        // RFC 5545 allows omitting both; the event then covers its start
        (None, None) => EventEnd::Until(dtstart.clone()),
    };

    let dtstamp = match prop_value(props, "DTSTAMP") {
        Some(value) => parse_utc_stamp(value)?,
        None => {
            log::debug!("event {} has no DTSTAMP, substituting the current time", uid);
            Utc::now()
        }
    };

    let mut event = Event::new(uid.clone(), summary, dtstart, end, dtstamp)?;

    if let Some(value) = prop_value(props, "DESCRIPTION") {
        event.set_description(Some(unescape_text(value)));
    }
    if let Some(value) = prop_value(props, "LOCATION") {
        event.set_location(Some(unescape_text(value)));
    }
    if let Some(value) = prop_value(props, "STATUS") {
        match EventStatus::from_ical(value) {
            Some(status) => event.set_status(Some(status)),
            None => log::warn!("event {} has unknown STATUS {:?}, ignoring it", uid, value),
        }
    }
    if let Some(value) = prop_value(props, "TRANSP") {
        if value.eq_ignore_ascii_case("TRANSPARENT") {
            event.set_transparency(Transparency::Transparent);
        }
    }
    if let Some(value) = prop_value(props, "SEQUENCE") {
        match value.parse::<u32>() {
            Ok(sequence) => event.force_sequence(sequence),
            Err(_) => log::warn!("event {} has invalid SEQUENCE {:?}, keeping 0", uid, value),
        }
    }
    if let Some(value) = prop_value(props, "RRULE") {
        event.set_rrule(Some(value.to_string()));
    }

    let mut exdates = Vec::new();
    for exdate_prop in props.iter().filter(|p| p.name == "EXDATE") {
        if let Some(value) = exdate_prop.value.as_deref() {
            for part in value.split(',').filter(|part| !part.is_empty()) {
                exdates.push(parse_time_value(part, exdate_prop)?);
            }
        }
    }
    if !exdates.is_empty() {
        event.set_exdates(exdates);
    }

    if let Some(rid_prop) = prop(props, "RECURRENCE-ID") {
        event.set_recurrence_id(Some(parse_time(rid_prop)?));
    }

    let categories: Vec<String> = props
        .iter()
        .filter(|p| p.name == "CATEGORIES")
        .filter_map(|p| p.value.as_deref())
        .flat_map(|value| value.split(','))
        .map(unescape_text)
        .filter(|category| !category.is_empty())
        .collect();
    if !categories.is_empty() {
        event.set_categories(categories);
    }

    if let Some(organizer_prop) = prop(props, "ORGANIZER") {
        if let Some(value) = organizer_prop.value.as_deref() {
            event.set_organizer(Some(Organizer {
                cal_address: value.to_string(),
                common_name: param(organizer_prop, "CN").map(str::to_string),
            }));
        }
    }

    let attendees: Vec<Attendee> = props
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .filter_map(|p| {
            p.value.as_deref().map(|value| Attendee {
                cal_address: value.to_string(),
                common_name: param(p, "CN").map(str::to_string),
                participation_status: param(p, "PARTSTAT").map(str::to_string),
                role: param(p, "ROLE").map(str::to_string),
            })
        })
        .collect();
    if !attendees.is_empty() {
        event.set_attendees(attendees);
    }

    if let Some(value) = prop_value(props, "COLOR") {
        event.set_color(Some(value.to_string()));
    }
    if let Some(value) = prop_value(props, "URL") {
        event.set_url(Some(value.to_string()));
    }

    event.set_alarms(ical_event.alarms.iter().filter_map(alarm_from_ical).collect());

    // Properties we do not interpret are preserved for the next generate
    for extra in props.iter().filter(|p| !HANDLED_PROPERTIES.contains(&p.name.as_str())) {
        event.add_extra_property(ExtensionProp {
            name: extra.name.clone(),
            value: extra.value.clone(),
            params: extra.params.clone().unwrap_or_default(),
        });
    }

    if let Some(value) = prop_value(props, "CREATED") {
        event.set_created(Some(parse_utc_stamp(value)?));
    }
    // Set last: the setters above stamp the event as locally modified,
    // which parsed data is not
    match prop_value(props, "LAST-MODIFIED") {
        Some(value) => event.set_last_modified(Some(parse_utc_stamp(value)?)),
        None => event.set_last_modified(None),
    }

    Ok(event)
}

fn alarm_from_ical(ical_alarm: &IcalAlarm) -> Option<Alarm> {
    let props = &ical_alarm.properties;
    let trigger = prop_value(props, "TRIGGER")?;
    Some(Alarm {
        action: prop_value(props, "ACTION").unwrap_or("DISPLAY").to_string(),
        trigger: trigger.to_string(),
        description: prop_value(props, "DESCRIPTION").map(unescape_text),
    })
}

fn prop<'a>(props: &'a [Property], name: &str) -> Option<&'a Property> {
    props.iter().find(|p| p.name == name)
}

fn prop_value<'a>(props: &'a [Property], name: &str) -> Option<&'a str> {
    prop(props, name).and_then(|p| p.value.as_deref())
}

/// The first value of the given parameter on a property
fn param<'a>(property: &'a Property, name: &str) -> Option<&'a str> {
    property
        .params
        .as_ref()?
        .iter()
        .find(|(param_name, _)| param_name == name)?
        .1
        .first()
        .map(String::as_str)
}

fn parse_time(property: &Property) -> DavResult<EventTime> {
    let value = property
        .value
        .as_deref()
        .ok_or_else(|| DavError::parse(format!("{} has no value", property.name)))?;
    parse_time_value(value, property)
}

fn parse_time_value(value: &str, property: &Property) -> DavResult<EventTime> {
    let is_date = param(property, "VALUE") == Some("DATE")
        || (value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()));

    if is_date {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d")
            .map_err(|err| DavError::parse(format!("invalid date {:?}: {}", value, err)))?;
        return Ok(EventTime::Date(date));
    }

    if let Some(naive) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(naive, "%Y%m%dT%H%M%S")
            .map_err(|err| DavError::parse(format!("invalid UTC date-time {:?}: {}", value, err)))?;
        return Ok(EventTime::Utc(DateTime::from_naive_utc_and_offset(naive, Utc)));
    }

    let local = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .map_err(|err| DavError::parse(format!("invalid date-time {:?}: {}", value, err)))?;

    match param(property, "TZID") {
        Some(tzid) => Ok(EventTime::Zoned { local, tzid: tzid.to_string() }),
        None => Ok(EventTime::Floating(local)),
    }
}

/// Parse a UTC timestamp property (DTSTAMP, CREATED, LAST-MODIFIED).
/// Some servers omit the trailing `Z` even though these are defined as UTC
fn parse_utc_stamp(value: &str) -> DavResult<DateTime<Utc>> {
    let naive = value.strip_suffix('Z').unwrap_or(value);
    NaiveDateTime::parse_from_str(naive, "%Y%m%dT%H%M%S")
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .map_err(|err| DavError::parse(format!("invalid timestamp {:?}: {}", value, err)))
}

/// Undo RFC 5545 TEXT escaping
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(escaped) => out.push(escaped),
            None => out.push('\\'),
        }
    }
    out
}

//! What discovery finds on a server: the account layout and its calendars

use std::convert::TryFrom;

use bitflags::bitflags;
use csscolorparser::Color;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::DavError;

bitflags! {
    /// Which component kinds a collection accepts, from its
    /// `supported-calendar-component-set` property
    #[derive(Serialize, Deserialize)]
    pub struct SupportedComponents: u8 {
        /// An event, such as a calendar meeting
        const EVENT = 1;
        /// A to-do item, such as a reminder
        const TODO = 2;
        /// A journal entry
        const JOURNAL = 4;
    }
}

impl TryFrom<&minidom::Element> for SupportedComponents {
    type Error = DavError;

    /// Create an instance from an XML `<supported-calendar-component-set>` element
    fn try_from(element: &minidom::Element) -> Result<Self, Self::Error> {
        if element.name() != "supported-calendar-component-set" {
            return Err(DavError::parse("element must be a <supported-calendar-component-set>"));
        }

        let mut flags = Self::empty();
        for child in element.children() {
            match child.attr("name") {
                None => continue,
                Some("VEVENT") => flags.insert(Self::EVENT),
                Some("VTODO") => flags.insert(Self::TODO),
                Some("VJOURNAL") => flags.insert(Self::JOURNAL),
                Some(other) => {
                    log::warn!("Unimplemented supported component type: {:?}. Ignoring it", other);
                    continue;
                }
            };
        }

        Ok(flags)
    }
}

/// One calendar collection found under the home set
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalendarRef {
    pub url: Url,
    pub display_name: String,
    pub color: Option<Color>,
    pub supported_components: SupportedComponents,
    /// The collection version at discovery time, if the server advertises one
    pub ctag: Option<String>,
    /// The initial sync cursor, if the server supports RFC 6578
    pub sync_token: Option<String>,
}

impl CalendarRef {
    pub fn supports_events(&self) -> bool {
        self.supported_components.contains(SupportedComponents::EVENT)
    }
}

/// A discovered account: the principal, its calendar home, and the calendars
/// found there
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub principal: Url,
    pub home_set: Url,
    pub calendars: Vec<CalendarRef>,
}

#[cfg(test)]
mod test {
    use super::*;
    use minidom::Element;

    #[test]
    fn test_supported_components_from_xml() {
        let xml = r#"<supported-calendar-component-set xmlns="urn:ietf:params:xml:ns:caldav">
            <comp name="VEVENT"/>
            <comp name="VTODO"/>
            <comp name="VFREEBUSY"/>
        </supported-calendar-component-set>"#;
        let element: Element = xml.parse().unwrap();
        let comps = SupportedComponents::try_from(&element).unwrap();
        assert!(comps.contains(SupportedComponents::EVENT));
        assert!(comps.contains(SupportedComponents::TODO));
        assert!(!comps.contains(SupportedComponents::JOURNAL));
    }

    #[test]
    fn test_supported_components_rejects_wrong_element() {
        let xml = r#"<resourcetype xmlns="DAV:"/>"#;
        let element: Element = xml.parse().unwrap();
        assert!(SupportedComponents::try_from(&element).is_err());
    }
}

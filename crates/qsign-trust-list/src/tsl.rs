//! ETSI TS 119 612 trusted list parsing
//!
//! Two documents are read: the EU list of trusted lists (LOTL), which only
//! contributes pointers to national lists, and the national trusted lists,
//! which contribute the certificates of their trust services.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// MIME type of XML trusted lists in LOTL pointers
pub const TSL_MIME_TYPE: &str = "application/vnd.etsi.tsl+xml";

const SERVICE_TYPE_PREFIX: &str = "http://uri.etsi.org/TrstSvc/Svctype/";
const ROOT_ELEMENT: &str = "TrustServiceStatusList";

/// Service statuses under which a service's certificates are trusted
const ACTIVE_STATUSES: &[&str] = &[
    "granted",
    "recognisedatnationallevel",
    "undersupervision",
    "supervisionincessation",
    "accredited",
    "setbynationallaw",
];

/// A pointer from the LOTL to a national trusted list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TslPointer {
    /// Where the list is published
    pub location: String,
    /// Scheme territory (country code)
    pub territory: Option<String>,
    /// Declared MIME type of the list
    pub mime_type: Option<String>,
}

impl TslPointer {
    /// Whether the pointer designates an XML list (PDF renderings are skipped)
    pub fn is_xml(&self) -> bool {
        self.mime_type
            .as_deref()
            .map_or(true, |m| m.to_ascii_lowercase().contains("xml"))
    }
}

/// Trust service types whose certificates become anchors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    /// CA issuing qualified certificates
    CaQc,
    /// Time-stamping authority
    Tsa,
    /// Qualified time-stamping authority
    TsaQtst,
    /// OCSP responder
    Ocsp,
    /// OCSP responder for qualified certificates
    OcspQc,
}

impl ServiceType {
    /// Map a `ServiceTypeIdentifier` URI
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri.trim().strip_prefix(SERVICE_TYPE_PREFIX)? {
            "CA/QC" => Some(ServiceType::CaQc),
            "TSA" => Some(ServiceType::Tsa),
            "TSA/QTST" => Some(ServiceType::TsaQtst),
            "Certstatus/OCSP" => Some(ServiceType::Ocsp),
            "Certstatus/OCSP/QC" => Some(ServiceType::OcspQc),
            _ => None,
        }
    }

    /// Short form as used in the URI
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::CaQc => "CA/QC",
            ServiceType::Tsa => "TSA",
            ServiceType::TsaQtst => "TSA/QTST",
            ServiceType::Ocsp => "Certstatus/OCSP",
            ServiceType::OcspQc => "Certstatus/OCSP/QC",
        }
    }
}

/// A trust service entry of a national list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustService {
    /// Service name, English when available
    pub name: String,
    /// Service type
    pub service_type: ServiceType,
    /// `ServiceStatus` URI
    pub status: Option<String>,
    /// DER certificates of the service's digital identity
    pub certificates: Vec<Vec<u8>>,
}

impl TrustService {
    /// Whether the current status grants trust
    pub fn is_active(&self) -> bool {
        match &self.status {
            None => true,
            Some(uri) => {
                let last = uri.trim().rsplit('/').next().unwrap_or_default();
                ACTIVE_STATUSES.contains(&last.to_ascii_lowercase().as_str())
            }
        }
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn xml_error(reader: &Reader<&[u8]>, e: impl std::fmt::Display) -> Error {
    Error::Xml(format!("at byte {}: {}", reader.buffer_position(), e))
}

/// Events delivered by [`walk`]
///
/// Each event carries the path of the element's ancestors; for text this is
/// the path down to the enclosing element.
enum XmlEvent<'a, 'e> {
    Start(&'a BytesStart<'e>),
    Text(&'a str),
    End(&'a str),
}

/// Drive `reader` to the end, tracking the element path
fn walk(xml: &str, mut on_event: impl FnMut(XmlEvent<'_, '_>, &[String])) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut saw_root = false;

    loop {
        match reader.read_event().map_err(|e| xml_error(&reader, e))? {
            Event::Start(e) => {
                let name = local_name(&e);
                if !saw_root {
                    if name != ROOT_ELEMENT {
                        return Err(Error::Xml(format!(
                            "expected {} root element, found {}",
                            ROOT_ELEMENT, name
                        )));
                    }
                    saw_root = true;
                }
                on_event(XmlEvent::Start(&e), &path);
                path.push(name);
            }
            Event::End(_) => {
                if let Some(name) = path.pop() {
                    on_event(XmlEvent::End(&name), &path);
                }
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| xml_error(&reader, e))?;
                if !text.trim().is_empty() {
                    on_event(XmlEvent::Text(text.trim()), &path);
                }
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c).into_owned();
                if !text.trim().is_empty() {
                    on_event(XmlEvent::Text(text.trim()), &path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(Error::Xml("document has no root element".to_string()));
    }
    if !path.is_empty() {
        return Err(Error::Xml(format!("unclosed element {}", path.join("/"))));
    }
    Ok(())
}

#[derive(Default)]
struct PointerBuilder {
    location: Option<String>,
    territory: Option<String>,
    mime_type: Option<String>,
}

/// Parse the `OtherTSLPointer` entries of a list of trusted lists
pub fn parse_pointers(xml: &str) -> Result<Vec<TslPointer>> {
    let mut current: Option<PointerBuilder> = None;
    let mut pointers = Vec::new();

    walk(xml, |event, path| match event {
        XmlEvent::Start(e) => {
            if e.local_name().as_ref() == b"OtherTSLPointer" {
                current = Some(PointerBuilder::default());
            }
        }
        XmlEvent::Text(text) => {
            let Some(pointer) = current.as_mut() else {
                return;
            };
            match path.last().map(String::as_str) {
                Some("TSLLocation") => pointer.location = Some(text.to_string()),
                Some("SchemeTerritory") => pointer.territory = Some(text.to_string()),
                Some("MimeType") => pointer.mime_type = Some(text.to_string()),
                _ => {}
            }
        }
        XmlEvent::End(name) => {
            if name != "OtherTSLPointer" {
                return;
            }
            if let Some(builder) = current.take() {
                match builder.location {
                    Some(location) => pointers.push(TslPointer {
                        location,
                        territory: builder.territory,
                        mime_type: builder.mime_type,
                    }),
                    None => tracing::warn!("Skipping OtherTSLPointer without TSLLocation"),
                }
            }
        }
    })?;

    tracing::debug!("Parsed {} trusted list pointer(s)", pointers.len());
    Ok(pointers)
}

#[derive(Default)]
struct ServiceBuilder {
    type_uri: Option<String>,
    status: Option<String>,
    names: Vec<(Option<String>, String)>,
    certificates: Vec<Vec<u8>>,
    pending_lang: Option<String>,
}

impl ServiceBuilder {
    fn build(self) -> Option<TrustService> {
        let type_uri = self.type_uri?;
        let Some(service_type) = ServiceType::from_uri(&type_uri) else {
            tracing::debug!("Ignoring service of type {}", type_uri);
            return None;
        };
        if self.certificates.is_empty() {
            return None;
        }

        let name = self
            .names
            .iter()
            .find(|(lang, _)| lang.as_deref() == Some("en"))
            .or_else(|| self.names.first())
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| format!("unnamed {} service", service_type.as_str()));

        Some(TrustService {
            name,
            service_type,
            status: self.status,
            certificates: self.certificates,
        })
    }
}

fn in_current_information(path: &[String]) -> bool {
    path.iter().any(|p| p == "ServiceInformation") && !path.iter().any(|p| p == "ServiceHistory")
}

/// Parse the trust services of a national trusted list
///
/// Only services of a recognised [`ServiceType`] carrying at least one
/// certificate are returned; history entries are ignored.
pub fn parse_services(xml: &str) -> Result<Vec<TrustService>> {
    let mut current: Option<ServiceBuilder> = None;
    let mut services = Vec::new();

    walk(xml, |event, path| match event {
        XmlEvent::Start(e) => {
            let name = e.local_name();
            if name.as_ref() == b"TSPService" {
                current = Some(ServiceBuilder::default());
            } else if name.as_ref() == b"Name"
                && path.last().map(String::as_str) == Some("ServiceName")
            {
                if let Some(builder) = current.as_mut() {
                    builder.pending_lang = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.local_name().as_ref() == b"lang")
                        .map(|a| String::from_utf8_lossy(&a.value).to_ascii_lowercase());
                }
            }
        }
        XmlEvent::Text(text) => {
            let Some(builder) = current.as_mut() else {
                return;
            };
            if !in_current_information(path) {
                return;
            }
            let parent = path.len().checked_sub(2).map(|i| path[i].as_str());
            match path.last().map(String::as_str) {
                Some("ServiceTypeIdentifier") => builder.type_uri = Some(text.to_string()),
                Some("ServiceStatus") => builder.status = Some(text.to_string()),
                Some("Name") if parent == Some("ServiceName") => {
                    let lang = builder.pending_lang.take();
                    builder.names.push((lang, text.to_string()));
                }
                Some("X509Certificate") => {
                    let compact: String = text.split_whitespace().collect();
                    match STANDARD.decode(compact) {
                        Ok(der) => builder.certificates.push(der),
                        Err(e) => tracing::warn!("Skipping undecodable X509Certificate: {}", e),
                    }
                }
                _ => {}
            }
        }
        XmlEvent::End(name) => {
            if name != "TSPService" {
                return;
            }
            if let Some(service) = current.take().and_then(ServiceBuilder::build) {
                services.push(service);
            }
        }
    })?;

    tracing::debug!("Parsed {} trust service(s)", services.len());
    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOTL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TrustServiceStatusList xmlns="http://uri.etsi.org/02231/v2#" xmlns:ns3="http://uri.etsi.org/02231/v2/additionaltypes#">
  <SchemeInformation>
    <SchemeTerritory>EU</SchemeTerritory>
    <PointersToOtherTSL>
      <OtherTSLPointer>
        <TSLLocation>https://tl.example.at/tl.xml</TSLLocation>
        <AdditionalInformation>
          <OtherInformation><SchemeTerritory>AT</SchemeTerritory></OtherInformation>
          <OtherInformation><ns3:MimeType>application/vnd.etsi.tsl+xml</ns3:MimeType></OtherInformation>
        </AdditionalInformation>
      </OtherTSLPointer>
      <OtherTSLPointer>
        <TSLLocation>https://tl.example.at/tl.pdf</TSLLocation>
        <AdditionalInformation>
          <OtherInformation><ns3:MimeType>application/pdf</ns3:MimeType></OtherInformation>
        </AdditionalInformation>
      </OtherTSLPointer>
      <OtherTSLPointer>
        <AdditionalInformation/>
      </OtherTSLPointer>
    </PointersToOtherTSL>
  </SchemeInformation>
</TrustServiceStatusList>"#;

    fn service_xml(type_suffix: &str, status: &str, cert_b64: &str) -> String {
        format!(
            r#"<TrustServiceStatusList xmlns="http://uri.etsi.org/02231/v2#">
  <TrustServiceProviderList>
    <TrustServiceProvider>
      <TSPServices>
        <TSPService>
          <ServiceInformation>
            <ServiceTypeIdentifier>http://uri.etsi.org/TrstSvc/Svctype/{type_suffix}</ServiceTypeIdentifier>
            <ServiceName>
              <Name xml:lang="de">Beispiel Dienst</Name>
              <Name xml:lang="en">Example &amp; Service</Name>
            </ServiceName>
            <ServiceDigitalIdentity>
              <DigitalId>
                <X509Certificate>
                  {cert_b64}
                </X509Certificate>
              </DigitalId>
            </ServiceDigitalIdentity>
            <ServiceStatus>http://uri.etsi.org/TrstSvc/TrustedList/Svcstatus/{status}</ServiceStatus>
          </ServiceInformation>
          <ServiceHistory>
            <ServiceHistoryInstance>
              <ServiceTypeIdentifier>http://uri.etsi.org/TrstSvc/Svctype/CA/QC</ServiceTypeIdentifier>
              <ServiceDigitalIdentity><DigitalId><X509Certificate>AAAA</X509Certificate></DigitalId></ServiceDigitalIdentity>
            </ServiceHistoryInstance>
          </ServiceHistory>
        </TSPService>
      </TSPServices>
    </TrustServiceProvider>
  </TrustServiceProviderList>
</TrustServiceStatusList>"#
        )
    }

    #[test]
    fn test_parse_pointers() {
        let pointers = parse_pointers(LOTL).unwrap();
        assert_eq!(pointers.len(), 2);

        assert_eq!(pointers[0].location, "https://tl.example.at/tl.xml");
        assert_eq!(pointers[0].territory.as_deref(), Some("AT"));
        assert_eq!(pointers[0].mime_type.as_deref(), Some(TSL_MIME_TYPE));
        assert!(pointers[0].is_xml());

        assert!(!pointers[1].is_xml());
    }

    #[test]
    fn test_parse_services_prefers_english_name() {
        let xml = service_xml("CA/QC", "granted", "MAMCAQE=");
        let services = parse_services(&xml).unwrap();

        assert_eq!(services.len(), 1);
        let service = &services[0];
        assert_eq!(service.name, "Example & Service");
        assert_eq!(service.service_type, ServiceType::CaQc);
        assert!(service.is_active());
        // History certificates are not collected
        assert_eq!(service.certificates, vec![vec![0x30, 0x03, 0x02, 0x01, 0x01]]);
    }

    #[test]
    fn test_parse_services_skips_unknown_types() {
        let xml = service_xml("EDS/Q", "granted", "MAMCAQE=");
        assert!(parse_services(&xml).unwrap().is_empty());
    }

    #[test]
    fn test_withdrawn_service_is_inactive() {
        let xml = service_xml("TSA/QTST", "withdrawn", "MAMCAQE=");
        let services = parse_services(&xml).unwrap();
        assert_eq!(services[0].service_type, ServiceType::TsaQtst);
        assert!(!services[0].is_active());
    }

    #[test]
    fn test_rejects_non_trust_list_documents() {
        let err = parse_pointers("<html><body>maintenance</body></html>").unwrap_err();
        assert!(err.to_string().contains("TrustServiceStatusList"));

        assert!(parse_services("").is_err());
        assert!(parse_services("<TrustServiceStatusList><Open>").is_err());
    }

    #[test]
    fn test_walk_reports_paths_in_document_order() {
        let xml = "<TrustServiceStatusList><A><B>text</B><![CDATA[raw]]></A></TrustServiceStatusList>";
        let mut seen = Vec::new();
        walk(xml, |event, path| {
            let entry = match event {
                XmlEvent::Start(e) => format!("start {}", local_name(e)),
                XmlEvent::Text(text) => format!("text {}", text),
                XmlEvent::End(name) => format!("end {}", name),
            };
            seen.push(format!("{} @{}", entry, path.join("/")));
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![
                "start TrustServiceStatusList @",
                "start A @TrustServiceStatusList",
                "start B @TrustServiceStatusList/A",
                "text text @TrustServiceStatusList/A/B",
                "end B @TrustServiceStatusList/A",
                "text raw @TrustServiceStatusList/A",
                "end A @TrustServiceStatusList",
                "end TrustServiceStatusList @",
            ]
        );
    }

    #[test]
    fn test_service_type_uris() {
        assert_eq!(
            ServiceType::from_uri("http://uri.etsi.org/TrstSvc/Svctype/Certstatus/OCSP/QC"),
            Some(ServiceType::OcspQc)
        );
        assert_eq!(ServiceType::from_uri("urn:other"), None);
    }
}

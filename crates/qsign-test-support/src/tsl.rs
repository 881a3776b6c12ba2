//! Minimal ETSI TS 119 612 documents

use base64::{engine::general_purpose::STANDARD, Engine};

const STATUS_PREFIX: &str = "http://uri.etsi.org/TrstSvc/TrustedList/Svcstatus/";
const TYPE_PREFIX: &str = "http://uri.etsi.org/TrstSvc/Svctype/";

/// A trust service entry for [`trust_list_xml`]
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    /// English service name
    pub name: String,
    /// Service type suffix, e.g. `TSA/QTST`
    pub service_type: String,
    /// Status suffix, e.g. `granted`
    pub status: String,
    /// DER certificates of the digital identity
    pub certificates: Vec<Vec<u8>>,
}

impl ServiceEntry {
    /// A granted service of the given type
    pub fn granted(name: &str, service_type: &str, certificate: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            service_type: service_type.to_string(),
            status: "granted".to_string(),
            certificates: vec![certificate],
        }
    }

    /// Change the status suffix
    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }
}

/// A list of trusted lists pointing at `(location, territory)` pairs
pub fn lotl_xml(pointers: &[(&str, &str)]) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<TrustServiceStatusList xmlns="http://uri.etsi.org/02231/v2#" xmlns:ns3="http://uri.etsi.org/02231/v2/additionaltypes#">
  <SchemeInformation>
    <SchemeTerritory>EU</SchemeTerritory>
    <PointersToOtherTSL>
"#,
    );
    for (location, territory) in pointers {
        out.push_str(&format!(
            r#"      <OtherTSLPointer>
        <TSLLocation>{location}</TSLLocation>
        <AdditionalInformation>
          <OtherInformation><SchemeTerritory>{territory}</SchemeTerritory></OtherInformation>
          <OtherInformation><ns3:MimeType>application/vnd.etsi.tsl+xml</ns3:MimeType></OtherInformation>
        </AdditionalInformation>
      </OtherTSLPointer>
"#
        ));
    }
    out.push_str(
        r#"    </PointersToOtherTSL>
  </SchemeInformation>
</TrustServiceStatusList>
"#,
    );
    out
}

/// A national trusted list with one provider offering `services`
pub fn trust_list_xml(territory: &str, services: &[ServiceEntry]) -> String {
    let mut out = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<TrustServiceStatusList xmlns="http://uri.etsi.org/02231/v2#">
  <SchemeInformation>
    <SchemeTerritory>{territory}</SchemeTerritory>
  </SchemeInformation>
  <TrustServiceProviderList>
    <TrustServiceProvider>
      <TSPServices>
"#
    );
    for service in services {
        let identities: String = service
            .certificates
            .iter()
            .map(|der| {
                format!(
                    "<DigitalId><X509Certificate>{}</X509Certificate></DigitalId>",
                    STANDARD.encode(der)
                )
            })
            .collect();
        out.push_str(&format!(
            r#"        <TSPService>
          <ServiceInformation>
            <ServiceTypeIdentifier>{TYPE_PREFIX}{service_type}</ServiceTypeIdentifier>
            <ServiceName><Name xml:lang="en">{name}</Name></ServiceName>
            <ServiceDigitalIdentity>{identities}</ServiceDigitalIdentity>
            <ServiceStatus>{STATUS_PREFIX}{status}</ServiceStatus>
          </ServiceInformation>
        </TSPService>
"#,
            service_type = service.service_type,
            name = service.name,
            status = service.status,
        ));
    }
    out.push_str(
        r#"      </TSPServices>
    </TrustServiceProvider>
  </TrustServiceProviderList>
</TrustServiceStatusList>
"#,
    );
    out
}

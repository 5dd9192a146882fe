//! SOAP 1.1 envelope construction and response parsing for the SII service.
use chrono::Utc;
use libxml::parser::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transform::SiiInvoiceData;
use crate::xml::{descendant_text, find_descendant};

/// SOAPAction header value for the single supported operation.
pub const SOAP_ACTION: &str = "http://www.aeat.es/SII/services/SiiStd#SuministroLR";

const SOAPENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SII_NS: &str = "http://www.agenciatributaria.es/wlpl/SiiStd/Aduanas/Tipos/espDatos/v1.0";

/// Errors raised while parsing an SII response.
#[derive(Debug, Error)]
pub enum ResponseParseError {
    #[error("response is not well-formed XML: {0}")]
    MalformedXml(String),
    #[error("response does not contain a RegistroLRFacturasEmitidas element")]
    MissingRegistration,
}

/// Registration outcome reported by AEAT.
///
/// `AceptadoConErrores` is an acceptance: the invoice was registered but AEAT
/// attached remarks. Only `Incorrecto` is a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Estado {
    Correcto,
    AceptadoConErrores,
    Incorrecto,
}

impl Estado {
    /// Unknown or missing states are treated as rejections.
    pub fn parse(value: &str) -> Self {
        match value {
            "Correcto" => Estado::Correcto,
            "AceptadoConErrores" => Estado::AceptadoConErrores,
            _ => Estado::Incorrecto,
        }
    }

    pub fn is_accepted(self) -> bool {
        !matches!(self, Estado::Incorrecto)
    }
}

/// Parsed SII registration response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiiResponse {
    /// AEAT's secure verification code for an accepted registration.
    pub csv: String,
    pub estado: Estado,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
}

/// Build the fixed-shape SOAP 1.1 envelope for one invoice registration.
///
/// One `DetalleIVA` block is emitted per VAT-rate bucket, in the order the
/// record carries them (ascending rate); every monetary value is rendered with
/// exactly two decimals and all free-text fields are XML-escaped.
pub fn build_envelope(record: &SiiInvoiceData) -> String {
    let mut tax_details = String::new();
    for detail in &record.tax_details {
        tax_details.push_str(&format!(
            r#"
                  <sii:DetalleIVA>
                    <sii:TipoImpositivo>{:.2}</sii:TipoImpositivo>
                    <sii:BaseImponible>{:.2}</sii:BaseImponible>
                    <sii:CuotaRepercutida>{:.2}</sii:CuotaRepercutida>
                  </sii:DetalleIVA>"#,
            detail.rate, detail.base_amount, detail.tax_amount
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope
  xmlns:soapenv="{SOAPENV_NS}"
  xmlns:sii="{SII_NS}">
  <soapenv:Header>
    <sii:Cabecera>
      <sii:NIFEmisor>{nif}</sii:NIFEmisor>
      <sii:NombreEmisor>{issuer_name}</sii:NombreEmisor>
      <sii:PeriodoLiquidacion>
        <sii:Ejercicio>{year}</sii:Ejercicio>
        <sii:Periodo>{period}</sii:Periodo>
      </sii:PeriodoLiquidacion>
      <sii:IntEncriptacion>utf-8</sii:IntEncriptacion>
    </sii:Cabecera>
  </soapenv:Header>
  <soapenv:Body>
    <sii:SuministroLRFacturasEmitidas>
      <sii:VersionSii>0,47</sii:VersionSii>
      <sii:DataSignature>
        <sii:Timestamp>{timestamp}</sii:Timestamp>
      </sii:DataSignature>
      <sii:RegistroLRFacturasEmitidas>
        <sii:IDFactura>
          <sii:NumSerieFacturaEmisor>{invoice_number}</sii:NumSerieFacturaEmisor>
          <sii:FechaExpedicionFacturaEmisor>{invoice_date}</sii:FechaExpedicionFacturaEmisor>
        </sii:IDFactura>
        <sii:Contraparte>
          <sii:NIF>{client_nif}</sii:NIF>
          <sii:NombreRazon>{client_name}</sii:NombreRazon>
        </sii:Contraparte>
        <sii:TipoDesglose>
          <sii:DesgloseFactura>
            <sii:Sujeta>
              <sii:NoExenta>
                <sii:TipoNoExenta>S1</sii:TipoNoExenta>
                <sii:DesgloseIVA>{tax_details}
                </sii:DesgloseIVA>
              </sii:NoExenta>
            </sii:Sujeta>
          </sii:DesgloseFactura>
        </sii:TipoDesglose>
        <sii:ImporteTotal>{total:.2}</sii:ImporteTotal>
        <sii:TipoOperacion>{operation}</sii:TipoOperacion>
      </sii:RegistroLRFacturasEmitidas>
    </sii:SuministroLRFacturasEmitidas>
  </soapenv:Body>
</soapenv:Envelope>"#,
        nif = escape_xml(&record.issuer_tax_id),
        issuer_name = escape_xml(&record.issuer_name),
        year = record.year,
        period = record.period,
        timestamp = Utc::now().to_rfc3339(),
        invoice_number = escape_xml(&record.invoice_number),
        invoice_date = record.invoice_date,
        client_nif = escape_xml(&record.client_tax_id),
        client_name = escape_xml(&record.client_name),
        tax_details = tax_details,
        total = record.total_amount,
        operation = escape_xml(&record.operation_type),
    )
}

/// Escape the five XML special characters in free-text content.
pub fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Parse an SII registration response.
///
/// Navigation tolerates any namespace prefixing on the enclosing elements (see
/// [`crate::xml`]), falling back one level at a time: a response missing the
/// SOAP envelope or body is still searched for the registration element. Only
/// a response with no `RegistroLRFacturasEmitidas` at all is a parse error.
///
/// # Errors
/// [`ResponseParseError`] for non-XML input or a missing registration element.
pub fn parse_response(xml: &str) -> Result<SiiResponse, ResponseParseError> {
    let doc = Parser::default()
        .parse_string(xml)
        .map_err(|e| ResponseParseError::MalformedXml(format!("{e:?}")))?;
    let root = doc
        .get_root_element()
        .ok_or_else(|| ResponseParseError::MalformedXml("empty document".into()))?;

    let body = find_descendant(&root, "Body").unwrap_or_else(|| root.clone());
    let scope = find_descendant(&body, "SuministroLRFacturasEmitidas").unwrap_or(body);
    let registro = if crate::xml::name_matches(&scope, "RegistroLRFacturasEmitidas") {
        scope
    } else {
        find_descendant(&scope, "RegistroLRFacturasEmitidas")
            .ok_or(ResponseParseError::MissingRegistration)?
    };

    let csv = descendant_text(&registro, "CSV").unwrap_or_default();
    let estado = descendant_text(&registro, "EstadoRegistro")
        .or_else(|| descendant_text(&registro, "Estado"))
        .map(|value| Estado::parse(&value))
        .unwrap_or(Estado::Incorrecto);
    let error_code = descendant_text(&registro, "CodigoErrorRegistro");
    let error_description = descendant_text(&registro, "DescripcionErrorRegistro");

    Ok(SiiResponse {
        csv,
        estado,
        error_code,
        error_description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TaxDetail;

    fn sample_record() -> SiiInvoiceData {
        SiiInvoiceData {
            invoice_number: "FAC-2024-001".into(),
            invoice_date: "12-05-2024".into(),
            year: 2024,
            period: "02".into(),
            issuer_tax_id: "B12345678".into(),
            issuer_name: "Gómez & Hijos <SL>".into(),
            client_tax_id: "12345678Z".into(),
            client_name: "Cliente \"Uno\"".into(),
            base_amount: 200.0,
            tax_amount: 31.0,
            total_amount: 231.0,
            tax_details: vec![
                TaxDetail {
                    rate: 10.0,
                    base_amount: 100.0,
                    tax_amount: 10.0,
                },
                TaxDetail {
                    rate: 21.0,
                    base_amount: 100.0,
                    tax_amount: 21.0,
                },
            ],
            operation_type: "A0".into(),
        }
    }

    #[test]
    fn envelope_contains_one_block_per_rate_in_order() {
        let envelope = build_envelope(&sample_record());
        assert_eq!(envelope.matches("<sii:DetalleIVA>").count(), 2);
        let first = envelope.find("<sii:TipoImpositivo>10.00<").expect("rate 10");
        let second = envelope.find("<sii:TipoImpositivo>21.00<").expect("rate 21");
        assert!(first < second);
        assert!(envelope.contains("<sii:ImporteTotal>231.00</sii:ImporteTotal>"));
        assert!(envelope.contains("<sii:Ejercicio>2024</sii:Ejercicio>"));
        assert!(envelope.contains("<sii:Periodo>02</sii:Periodo>"));
    }

    #[test]
    fn envelope_escapes_free_text() {
        let envelope = build_envelope(&sample_record());
        assert!(envelope.contains("Gómez &amp; Hijos &lt;SL&gt;"));
        assert!(envelope.contains("Cliente &quot;Uno&quot;"));
        assert!(!envelope.contains("Hijos <SL>"));
    }

    #[test]
    fn envelope_is_well_formed() {
        let envelope = build_envelope(&sample_record());
        Parser::default()
            .parse_string(&envelope)
            .expect("envelope parses");
    }

    #[test]
    fn escape_covers_all_five_characters() {
        assert_eq!(
            escape_xml(r#"a&b<c>d"e'f"#),
            "a&amp;b&lt;c&gt;d&quot;e&apos;f"
        );
    }

    fn accepted_response(prefix: &str, ns_decl: &str) -> String {
        let p = |name: &str| {
            if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}:{name}")
            }
        };
        format!(
            "<{env} {ns}><{body}><{sum}><{reg}>\
             <{csv}>CSVCODE123</{csv}><{estado}>Correcto</{estado}>\
             </{reg}></{sum}></{body}></{env}>",
            env = p("Envelope"),
            ns = ns_decl,
            body = p("Body"),
            sum = p("SuministroLRFacturasEmitidas"),
            reg = p("RegistroLRFacturasEmitidas"),
            csv = p("CSV"),
            estado = p("EstadoRegistro"),
        )
    }

    #[test]
    fn parses_response_with_soap_prefix() {
        let xml = accepted_response("soap", r#"xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/""#);
        let parsed = parse_response(&xml).expect("parse");
        assert_eq!(parsed.csv, "CSVCODE123");
        assert_eq!(parsed.estado, Estado::Correcto);
    }

    #[test]
    fn parses_response_with_authority_prefix() {
        let xml = accepted_response("siiR", r#"xmlns:siiR="urn:aeat""#);
        let parsed = parse_response(&xml).expect("parse");
        assert_eq!(parsed.csv, "CSVCODE123");
    }

    #[test]
    fn parses_response_without_prefix() {
        let xml = accepted_response("", "");
        let parsed = parse_response(&xml).expect("parse");
        assert_eq!(parsed.csv, "CSVCODE123");
        assert!(parsed.estado.is_accepted());
    }

    #[test]
    fn parses_rejection_with_error_details() {
        let xml = "<Envelope><Body><SuministroLRFacturasEmitidas>\
                   <RegistroLRFacturasEmitidas>\
                   <CSV></CSV><EstadoRegistro>Incorrecto</EstadoRegistro>\
                   <CodigoErrorRegistro>1100</CodigoErrorRegistro>\
                   <DescripcionErrorRegistro>NIF no identificado</DescripcionErrorRegistro>\
                   </RegistroLRFacturasEmitidas>\
                   </SuministroLRFacturasEmitidas></Body></Envelope>";
        let parsed = parse_response(xml).expect("parse");
        assert_eq!(parsed.estado, Estado::Incorrecto);
        assert_eq!(parsed.error_code.as_deref(), Some("1100"));
        assert_eq!(
            parsed.error_description.as_deref(),
            Some("NIF no identificado")
        );
        assert!(!parsed.estado.is_accepted());
    }

    #[test]
    fn missing_registration_is_an_error() {
        let err = parse_response("<Envelope><Body/></Envelope>").unwrap_err();
        assert!(matches!(err, ResponseParseError::MissingRegistration));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let err = parse_response("this is not xml").unwrap_err();
        assert!(matches!(err, ResponseParseError::MalformedXml(_)));
    }

    #[test]
    fn unknown_estado_is_treated_as_rejection() {
        assert_eq!(Estado::parse("Desconocido"), Estado::Incorrecto);
        assert_eq!(Estado::parse("AceptadoConErrores"), Estado::AceptadoConErrores);
        assert!(Estado::AceptadoConErrores.is_accepted());
    }
}

//! Cielo XML wire format (webservice version 1.2.1)

use crate::payments::types::{TransactionRequest, TransactionResponse, TransactionStatus};
use encoding_rs::{Encoding, UTF_8};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

pub const API_VERSION: &str = "1.2.1";
const CURRENCY_BRL: &str = "986";
const LANGUAGE: &str = "PT";

/// Charset declared by, and used to encode, every request document
pub const DOCUMENT_ENCODING: &str = "ISO-8859-1";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("failed to write XML: {0}")]
    Write(String),
    #[error("failed to read XML: {0}")]
    Read(String),
    #[error("document has no root element")]
    MissingRoot,
    #[error("unexpected root element <{0}>")]
    UnexpectedRoot(String),
}

/// Affiliation credentials sent in `dados-ec`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub number: String,
    pub key: String,
}

struct XmlBuilder {
    writer: Writer<Vec<u8>>,
}

impl XmlBuilder {
    fn new() -> Result<Self, XmlError> {
        let mut builder = Self {
            writer: Writer::new(Vec::new()),
        };
        builder.write(Event::Decl(BytesDecl::new("1.0", Some(DOCUMENT_ENCODING), None)))?;
        Ok(builder)
    }

    fn write(&mut self, event: Event<'_>) -> Result<&mut Self, XmlError> {
        self.writer
            .write_event(event)
            .map_err(|e| XmlError::Write(e.to_string()))?;
        Ok(self)
    }

    fn root(&mut self, name: &str, id: &str) -> Result<&mut Self, XmlError> {
        let start =
            BytesStart::new(name).with_attributes([("id", id), ("versao", API_VERSION)]);
        self.write(Event::Start(start))
    }

    fn open(&mut self, name: &str) -> Result<&mut Self, XmlError> {
        self.write(Event::Start(BytesStart::new(name)))
    }

    fn close(&mut self, name: &str) -> Result<&mut Self, XmlError> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn leaf(&mut self, name: &str, value: &str) -> Result<&mut Self, XmlError> {
        self.open(name)?;
        self.write(Event::Text(BytesText::new(value)))?;
        self.close(name)
    }

    fn merchant(&mut self, credentials: &Credentials) -> Result<&mut Self, XmlError> {
        self.open("dados-ec")?
            .leaf("numero", &credentials.number)?
            .leaf("chave", &credentials.key)?
            .close("dados-ec")
    }

    fn finish(self) -> Result<String, XmlError> {
        String::from_utf8(self.writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
    }
}

/// `requisicao-transacao` document
pub fn transaction_request(
    request: &TransactionRequest,
    credentials: &Credentials,
    id: &str,
) -> Result<String, XmlError> {
    let mut xml = XmlBuilder::new()?;
    xml.root("requisicao-transacao", id)?.merchant(credentials)?;

    if let Some(card) = &request.card {
        xml.open("dados-portador")?
            .leaf("numero", &card.number)?
            .leaf("validade", &card.expiry.to_cielo())?
            // 1: security code informed
            .leaf("indicador", "1")?
            .leaf("codigo-seguranca", &card.cvv)?
            .leaf("nome-portador", &card.holder_name)?
            .close("dados-portador")?;
    }

    xml.open("dados-pedido")?
        .leaf("numero", &request.reference)?
        .leaf("valor", &request.amount_cents.to_string())?
        .leaf("moeda", CURRENCY_BRL)?
        .leaf(
            "data-hora",
            &request.created_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        )?
        .leaf("idioma", LANGUAGE)?
        .close("dados-pedido")?;

    xml.open("forma-pagamento")?
        .leaf("bandeira", request.brand.as_str())?
        .leaf("produto", request.product.as_str())?
        .leaf("parcelas", &request.installments.max(1).to_string())?
        .close("forma-pagamento")?;

    xml.leaf("url-retorno", &request.return_url)?
        .leaf("autorizar", &u8::from(request.authorization).to_string())?
        .leaf("capturar", if request.capture { "true" } else { "false" })?
        .close("requisicao-transacao")?;

    xml.finish()
}

/// `requisicao-consulta` document
pub fn query_request(tid: &str, credentials: &Credentials, id: &str) -> Result<String, XmlError> {
    let mut xml = XmlBuilder::new()?;
    xml.root("requisicao-consulta", id)?
        .leaf("tid", tid)?
        .merchant(credentials)?
        .close("requisicao-consulta")?;
    xml.finish()
}

/// `requisicao-cancelamento` document, partial when `amount_cents` is set
pub fn cancel_request(
    tid: &str,
    amount_cents: Option<u64>,
    credentials: &Credentials,
    id: &str,
) -> Result<String, XmlError> {
    let mut xml = XmlBuilder::new()?;
    xml.root("requisicao-cancelamento", id)?
        .leaf("tid", tid)?
        .merchant(credentials)?;
    if let Some(amount) = amount_cents {
        xml.leaf("valor", &amount.to_string())?;
    }
    xml.close("requisicao-cancelamento")?;
    xml.finish()
}

fn document_encoding() -> &'static Encoding {
    Encoding::for_label(DOCUMENT_ENCODING.as_bytes()).unwrap_or(UTF_8)
}

/// Encode a finished document in [`DOCUMENT_ENCODING`]. Characters outside
/// the charset become numeric character references.
pub fn encode_document(document: &str) -> Vec<u8> {
    let (bytes, _, _) = document_encoding().encode(document);
    bytes.into_owned()
}

/// `mensagem=<document>` form body, percent-encoded from the Latin-1 bytes
pub fn form_body(document: &str) -> String {
    let encoded: String =
        url::form_urlencoded::byte_serialize(&encode_document(document)).collect();
    format!("mensagem={}", encoded)
}

/// Decode an answer using the `Content-Type` charset, else the charset in
/// the XML declaration, else UTF-8.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_param)
        .or_else(|| declared_encoding(bytes))
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let head = bytes.get(..bytes.len().min(128))?;
    let head = String::from_utf8_lossy(head);
    let decl = head.trim_start().strip_prefix("<?xml")?;
    let decl = &decl[..decl.find("?>")?];
    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    Some(value[..value.find(quote)?].to_string())
}

/// Parse a `transacao` or `erro` answer.
pub fn parse_response(body: &str) -> Result<TransactionResponse, XmlError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut root: Option<String> = None;
    let mut response = TransactionResponse::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                if root.is_none() {
                    root = Some(name.clone());
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|e| XmlError::Read(e.to_string()))?
                    .into_owned();
                assign(&mut response, &path, text);
            }
            Ok(Event::CData(data)) => {
                let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                assign(&mut response, &path, text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(XmlError::Read(e.to_string())),
        }
    }

    match root.as_deref() {
        Some("transacao") | Some("erro") => Ok(response),
        Some(other) => Err(XmlError::UnexpectedRoot(other.to_string())),
        None => Err(XmlError::MissingRoot),
    }
}

fn assign(response: &mut TransactionResponse, path: &[String], text: String) {
    let path: Vec<&str> = path.iter().map(String::as_str).collect();
    match path.as_slice() {
        ["erro", "codigo"] => response.error_code = Some(text),
        ["erro", "mensagem"] => response.error_message = Some(text),
        ["transacao", "tid"] => response.transaction_id = Some(text),
        ["transacao", "status"] => {
            response.status = text.trim().parse().ok().map(TransactionStatus::from_code)
        }
        ["transacao", "url-autenticacao"] => response.authentication_url = Some(text),
        ["transacao", "autorizacao", "lr"] => response.authorization_code = Some(text),
        ["transacao", "autorizacao", "mensagem"] => response.authorization_message = Some(text),
        _ => {}
    }
}

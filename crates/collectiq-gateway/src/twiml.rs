//! TwiML documents returned to, or pushed at, the carrier.

/// Escape text for inclusion in an XML attribute or element.
pub fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Connect the call to our media-stream websocket.
pub fn connect_stream(stream_url: &str, payer_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{url}">
      <Parameter name="payerId" value="{payer}"/>
    </Stream>
  </Connect>
</Response>"#,
        url = xml_escape(stream_url),
        payer = xml_escape(payer_id),
    )
}

/// Speak a message and hang up.
pub fn say_and_hangup(message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say>{}</Say>
  <Hangup/>
</Response>"#,
        xml_escape(message)
    )
}

/// Hold message followed by a dial to `number`.
pub fn transfer(number: &str) -> String {
    format!(
        "<Response><Say>Please hold while I connect you to a specialist.</Say><Dial>{}</Dial></Response>",
        xml_escape(number)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_stream_escapes() {
        let xml = connect_stream("wss://example.com/collect-iq/media-stream?payerId=1&x=2", "1");
        assert!(xml.contains("payerId=1&amp;x=2"));
        assert!(xml.contains(r#"<Parameter name="payerId" value="1"/>"#));
        assert!(xml.contains("<Connect>"));
    }

    #[test]
    fn test_transfer_twiml() {
        assert_eq!(
            transfer("+15550001111"),
            "<Response><Say>Please hold while I connect you to a specialist.</Say><Dial>+15550001111</Dial></Response>"
        );
    }

    #[test]
    fn test_say_and_hangup() {
        let xml = say_and_hangup("Sorry <error>");
        assert!(xml.contains("<Say>Sorry &lt;error&gt;</Say>"));
        assert!(xml.contains("<Hangup/>"));
    }
}

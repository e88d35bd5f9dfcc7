use std::collections::HashMap;

use anyhow::bail;

use crate::core::{EventState, RawEvent};

/// Parses `Code=VideoMotion;action=Start;index=0` style frames. `data` swallows the
/// rest of the frame since it usually holds JSON.
/// `Ok(None)` when the frame carries no event code.
pub fn parse_frame(body: &str, separator: &str) -> anyhow::Result<Option<RawEvent>> {
    let mut fields: HashMap<&str, &str> = HashMap::new();
    let mut rest = body.trim();

    while !rest.is_empty() {
        let (item, tail) = rest.split_once(separator).unwrap_or((rest, ""));

        let Some((key, value)) = item.split_once('=') else {
            bail!("malformed field {:?} in frame {:?}", item, body);
        };
        let key = key.trim();

        if key == "data" {
            let data = rest.split_once('=').map(|(_, v)| v).unwrap_or_default();
            fields.insert(key, data.trim());
            break;
        }

        fields.insert(key, value.trim());
        rest = tail.trim_start();
    }

    let Some(code) = fields.get("Code").filter(|c| !c.is_empty()) else {
        return Ok(None);
    };

    let action = fields.get("action").copied().unwrap_or_default();
    let state = match action {
        "Start" => EventState::Active,
        "Stop" => EventState::Inactive,
        _ => EventState::Other,
    };

    Ok(Some(RawEvent {
        code: code.to_string(),
        action: action.to_string(),
        state,
        index: fields.get("index").and_then(|i| i.parse().ok()),
        data: fields.get("data").map(|d| d.to_string()),
    }))
}

// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Minimal element lookup for the flat SOAP bodies printers send back.
//!
//! Elements are matched by local name, so `<u:JobId>` and `<JobId>` are
//! the same element.

/// Text of every element named `name`, in document order.
pub fn elements_text(xml: &str, name: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            break;
        };
        let tag = &after[..end];
        rest = &after[end + 1..];

        if tag.starts_with('/') || tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }
        if tag.ends_with('/') {
            if local_name(tag.trim_end_matches('/')) == name {
                found.push(String::new());
            }
            continue;
        }
        if local_name(tag) != name {
            continue;
        }
        if let Some(close) = rest.find("</") {
            found.push(unescape(rest[..close].trim()));
        }
    }
    found
}

/// Text of the first element named `name`.
pub fn element_text(xml: &str, name: &str) -> Option<String> {
    elements_text(xml, name).into_iter().next()
}

fn local_name(tag: &str) -> &str {
    let qualified = tag.split_whitespace().next().unwrap_or("");
    qualified.rsplit(':').next().unwrap_or(qualified)
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

//! PowerShell payload preparation.
//!
//! Scripts travel to the remote shell as a single `-EncodedCommand`
//! argument: the script text as UTF-16LE code units, base64-encoded.
//! Command lines optionally get a working-directory prefix.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::DEFAULT_WORKING_DIR;

/// Encodes script text for `powershell.exe -EncodedCommand`.
///
/// PowerShell expects base64 over UTF-16LE, low byte first. The encoding
/// itself cannot fail; a mismatch only ever surfaces remotely as a shell
/// parse failure.
pub fn encode_script(script: &str) -> String {
    let mut bytes = Vec::with_capacity(script.len() * 2);
    for unit in script.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    STANDARD.encode(bytes)
}

/// Builds the full PowerShell invocation for script content.
pub fn powershell_invocation(script: &str) -> String {
    format!(
        "powershell.exe -NonInteractive -EncodedCommand {}",
        encode_script(script)
    )
}

/// Prefixes `payload` with a directory change when `working_dir` is set
/// and differs from the platform root.
///
/// The directory is single-quoted verbatim; embedded single quotes in the
/// path are not escaped.
pub fn compose(payload: &str, working_dir: &str) -> String {
    if working_dir.is_empty() || working_dir == DEFAULT_WORKING_DIR {
        payload.to_string()
    } else {
        format!("cd '{}'; {}", working_dir, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_utf16le(encoded: &str) -> String {
        let bytes = STANDARD.decode(encoded).unwrap();
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).unwrap()
    }

    #[test]
    fn test_encode_known_vector() {
        // 'a' = 0x0061, 'b' = 0x0062 -> 61 00 62 00 -> "YQBiAA=="
        assert_eq!(encode_script("ab"), "YQBiAA==");
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode_script(""), "");
    }

    #[test]
    fn test_encode_round_trip() {
        let script = "Get-ChildItem 'C:\\Program Files'\nWrite-Output \"done\"";
        assert_eq!(decode_utf16le(&encode_script(script)), script);
    }

    #[test]
    fn test_encode_round_trip_non_bmp() {
        // Code points above U+FFFF encode as surrogate pairs.
        let script = "Write-Output '\u{1F389} déployé'";
        assert_eq!(decode_utf16le(&encode_script(script)), script);
    }

    #[test]
    fn test_powershell_invocation() {
        assert_eq!(
            powershell_invocation("ab"),
            "powershell.exe -NonInteractive -EncodedCommand YQBiAA=="
        );
    }

    #[test]
    fn test_compose_default_root_unchanged() {
        assert_eq!(compose("Get-Date", "C:\\"), "Get-Date");
        assert_eq!(compose("Get-Date", ""), "Get-Date");
    }

    #[test]
    fn test_compose_with_working_dir() {
        assert_eq!(
            compose("Get-Date", "D:\\data"),
            "cd 'D:\\data'; Get-Date"
        );
    }

    #[test]
    fn test_compose_does_not_escape_quotes() {
        // Embedded single quotes pass through verbatim.
        assert_eq!(
            compose("Get-Date", "C:\\it's here"),
            "cd 'C:\\it's here'; Get-Date"
        );
    }
}

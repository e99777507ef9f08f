/// Convierte la clave de una transformación en un nombre de directorio seguro.
///
/// - alfanuméricos ASCII, `-` y `_` se mantienen
/// - cualquier otro byte (incluidos `~`, `.`, `/` y `%`) pasa a `%XX`
///
/// Como `%` también se codifica, dos claves distintas nunca comparten directorio.
pub fn sanitize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Indica si un nombre de archivo es oculto o un marcador (`.crc`, `_SUCCESS`, ...).
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

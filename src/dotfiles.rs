const DOT_PREFIX: &str = "dot-";

/// Maps a package node name `dot-X` to its target name `.X`.
///
/// `X` must be non-empty and must not itself start with a dot, so `dot-`
/// and `dot-.foo` pass through unchanged.
pub fn adjust_dotfile(package_node: &str) -> String {
    match package_node.strip_prefix(DOT_PREFIX) {
        Some(rest) if !rest.is_empty() && !rest.starts_with('.') => format!(".{}", rest),
        _ => package_node.to_string(),
    }
}

/// Reverse of [`adjust_dotfile`]: `.X` becomes `dot-X`. Only used when
/// unstowing in compat mode, where the target tree drives the traversal.
pub fn unadjust_dotfile(target_node: &str) -> String {
    if target_node == "." || target_node == ".." {
        return target_node.to_string();
    }
    match target_node.strip_prefix('.') {
        Some(rest) => format!("{}{}", DOT_PREFIX, rest),
        None => target_node.to_string(),
    }
}

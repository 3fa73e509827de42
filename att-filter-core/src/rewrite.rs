//! Applies a matched template to a transfer

use tracing::debug;

use crate::config::FlagSnapshot;
use crate::template::RewriteTemplate;

/// Overwrite the template's bytes in `span`, in listed order
///
/// Mutations that need the header fix are skipped while it is off. Returns the
/// number of bytes written.
pub fn apply_mutations(span: &mut [u8], template: &RewriteTemplate, flags: FlagSnapshot) -> usize {
    let mut written = 0;
    for m in template.mutations {
        if m.needs_fix_headers && !flags.fix_headers {
            continue;
        }
        // A successful match has already checked every pattern offset exists
        if let Some(slot) = span.get_mut(m.offset) {
            *slot = m.value;
            written += 1;
        }
    }
    debug!(
        "Rewrote {} byte(s) with template {} (fix_headers={})",
        written, template.name, flags.fix_headers
    );
    written
}

/// Declared length the transfer should carry after the rewrite, if it changes
pub fn truncated_length(template: &RewriteTemplate, flags: FlagSnapshot) -> Option<usize> {
    let len = template.truncate_length_to?;
    if template.gated_by_fix_headers && !flags.fix_headers {
        return None;
    }
    Some(len)
}

/// Apply the byte mutations and then the length change in one step
pub fn rewrite(
    span: &mut [u8],
    declared_length: &mut usize,
    template: &RewriteTemplate,
    flags: FlagSnapshot,
) {
    apply_mutations(span, template, flags);
    if let Some(len) = truncated_length(template, flags) {
        *declared_length = len;
    }
}

use a11yscan_core::WcagLevel;

/// One WCAG 2.1 success criterion with the instruction handed to the model
/// when its mini-batch is analyzed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criterion {
    pub id: &'static str,
    pub name: &'static str,
    pub level: WcagLevel,
    pub instruction: &'static str,
}

const fn c(
    id: &'static str,
    name: &'static str,
    level: WcagLevel,
    instruction: &'static str,
) -> Criterion {
    Criterion {
        id,
        name,
        level,
        instruction,
    }
}

/// WCAG 2.1 success criteria. Kept in numeric document order here; callers
/// get a deterministic lexicographic order from `criteria_for_level`.
pub const CRITERIA: &[Criterion] = &[
    c("1.1.1", "Non-text Content", WcagLevel::A,
      "Check that every image, icon, and control has a text alternative serving the same purpose, or is marked decorative."),
    c("1.2.1", "Audio-only and Video-only (Prerecorded)", WcagLevel::A,
      "Check that prerecorded audio-only content has a transcript and video-only content has a transcript or audio track."),
    c("1.2.2", "Captions (Prerecorded)", WcagLevel::A,
      "Check that prerecorded video with audio provides synchronized captions."),
    c("1.2.3", "Audio Description or Media Alternative (Prerecorded)", WcagLevel::A,
      "Check that prerecorded video provides an audio description or a full media alternative."),
    c("1.2.4", "Captions (Live)", WcagLevel::Aa,
      "Check that live audio content in synchronized media has captions."),
    c("1.2.5", "Audio Description (Prerecorded)", WcagLevel::Aa,
      "Check that prerecorded video content provides audio description."),
    c("1.2.6", "Sign Language (Prerecorded)", WcagLevel::Aaa,
      "Check that prerecorded audio content provides sign language interpretation."),
    c("1.2.7", "Extended Audio Description (Prerecorded)", WcagLevel::Aaa,
      "Check that extended audio description is provided where pauses are insufficient."),
    c("1.2.8", "Media Alternative (Prerecorded)", WcagLevel::Aaa,
      "Check that a full text alternative exists for prerecorded synchronized media."),
    c("1.2.9", "Audio-only (Live)", WcagLevel::Aaa,
      "Check that live audio-only content has an equivalent text alternative."),
    c("1.3.1", "Info and Relationships", WcagLevel::A,
      "Check that headings, lists, tables, and form labels are expressed in markup, not only visually."),
    c("1.3.2", "Meaningful Sequence", WcagLevel::A,
      "Check that the DOM order preserves the meaning of the visual reading order."),
    c("1.3.3", "Sensory Characteristics", WcagLevel::A,
      "Check that instructions do not rely solely on shape, color, size, location, or sound."),
    c("1.3.4", "Orientation", WcagLevel::Aa,
      "Check that content does not lock itself to a single display orientation."),
    c("1.3.5", "Identify Input Purpose", WcagLevel::Aa,
      "Check that common input fields carry autocomplete attributes identifying their purpose."),
    c("1.3.6", "Identify Purpose", WcagLevel::Aaa,
      "Check that the purpose of UI components, icons, and regions can be programmatically determined."),
    c("1.4.1", "Use of Color", WcagLevel::A,
      "Check that color is not the only visual means of conveying information or distinguishing links."),
    c("1.4.2", "Audio Control", WcagLevel::A,
      "Check that audio playing automatically for more than three seconds can be paused or muted."),
    c("1.4.3", "Contrast (Minimum)", WcagLevel::Aa,
      "Check that normal text has at least 4.5:1 contrast and large text at least 3:1."),
    c("1.4.4", "Resize Text", WcagLevel::Aa,
      "Check that text can be resized to 200% without loss of content or functionality."),
    c("1.4.5", "Images of Text", WcagLevel::Aa,
      "Check that text is rendered as text rather than images, except logos."),
    c("1.4.6", "Contrast (Enhanced)", WcagLevel::Aaa,
      "Check that normal text has at least 7:1 contrast and large text at least 4.5:1."),
    c("1.4.7", "Low or No Background Audio", WcagLevel::Aaa,
      "Check that speech audio has no or very quiet background sounds."),
    c("1.4.8", "Visual Presentation", WcagLevel::Aaa,
      "Check that blocks of text offer user-selectable colors, narrow widths, and adequate spacing."),
    c("1.4.9", "Images of Text (No Exception)", WcagLevel::Aaa,
      "Check that images of text are used only for decoration or where essential."),
    c("1.4.10", "Reflow", WcagLevel::Aa,
      "Check that content reflows to 320 CSS pixels without two-dimensional scrolling."),
    c("1.4.11", "Non-text Contrast", WcagLevel::Aa,
      "Check that UI components and meaningful graphics have at least 3:1 contrast."),
    c("1.4.12", "Text Spacing", WcagLevel::Aa,
      "Check that overriding text spacing properties causes no loss of content."),
    c("1.4.13", "Content on Hover or Focus", WcagLevel::Aa,
      "Check that hover and focus popovers are dismissible, hoverable, and persistent."),
    c("2.1.1", "Keyboard", WcagLevel::A,
      "Check that all functionality is operable through a keyboard interface."),
    c("2.1.2", "No Keyboard Trap", WcagLevel::A,
      "Check that keyboard focus can always be moved away using standard keys."),
    c("2.1.3", "Keyboard (No Exception)", WcagLevel::Aaa,
      "Check that all functionality is keyboard operable without timing exceptions."),
    c("2.1.4", "Character Key Shortcuts", WcagLevel::A,
      "Check that single-character shortcuts can be turned off, remapped, or are focus-scoped."),
    c("2.2.1", "Timing Adjustable", WcagLevel::A,
      "Check that time limits can be turned off, adjusted, or extended."),
    c("2.2.2", "Pause, Stop, Hide", WcagLevel::A,
      "Check that moving, blinking, or auto-updating content can be paused, stopped, or hidden."),
    c("2.2.3", "No Timing", WcagLevel::Aaa,
      "Check that timing is not essential to the content or activity."),
    c("2.2.4", "Interruptions", WcagLevel::Aaa,
      "Check that interruptions can be postponed or suppressed by the user."),
    c("2.2.5", "Re-authenticating", WcagLevel::Aaa,
      "Check that re-authenticating does not lose user data."),
    c("2.2.6", "Timeouts", WcagLevel::Aaa,
      "Check that users are warned about inactivity timeouts that could cause data loss."),
    c("2.3.1", "Three Flashes or Below Threshold", WcagLevel::A,
      "Check that nothing flashes more than three times per second above the general flash thresholds."),
    c("2.3.2", "Three Flashes", WcagLevel::Aaa,
      "Check that nothing flashes more than three times per second at all."),
    c("2.3.3", "Animation from Interactions", WcagLevel::Aaa,
      "Check that motion animation triggered by interaction can be disabled."),
    c("2.4.1", "Bypass Blocks", WcagLevel::A,
      "Check that a skip link or landmark structure lets users bypass repeated blocks."),
    c("2.4.2", "Page Titled", WcagLevel::A,
      "Check that the page has a title describing its topic or purpose."),
    c("2.4.3", "Focus Order", WcagLevel::A,
      "Check that the focus order preserves meaning and operability."),
    c("2.4.4", "Link Purpose (In Context)", WcagLevel::A,
      "Check that each link's purpose is clear from its text or immediate context."),
    c("2.4.5", "Multiple Ways", WcagLevel::Aa,
      "Check that more than one way exists to locate a page (navigation, search, sitemap)."),
    c("2.4.6", "Headings and Labels", WcagLevel::Aa,
      "Check that headings and labels describe their topic or purpose."),
    c("2.4.7", "Focus Visible", WcagLevel::Aa,
      "Check that keyboard focus has a visible indicator."),
    c("2.4.8", "Location", WcagLevel::Aaa,
      "Check that users can tell where they are within a set of pages (breadcrumbs, highlighted nav)."),
    c("2.4.9", "Link Purpose (Link Only)", WcagLevel::Aaa,
      "Check that each link's purpose is clear from its link text alone."),
    c("2.4.10", "Section Headings", WcagLevel::Aaa,
      "Check that sections of content are organized with headings."),
    c("2.5.1", "Pointer Gestures", WcagLevel::A,
      "Check that multipoint or path-based gestures have single-pointer alternatives."),
    c("2.5.2", "Pointer Cancellation", WcagLevel::A,
      "Check that down-events do not trigger functions, or completion can be aborted or undone."),
    c("2.5.3", "Label in Name", WcagLevel::A,
      "Check that the accessible name of labeled controls contains their visible label text."),
    c("2.5.4", "Motion Actuation", WcagLevel::A,
      "Check that device-motion features have UI alternatives and can be disabled."),
    c("2.5.5", "Target Size", WcagLevel::Aaa,
      "Check that pointer targets are at least 44 by 44 CSS pixels or have equivalents."),
    c("2.5.6", "Concurrent Input Mechanisms", WcagLevel::Aaa,
      "Check that the page does not restrict use of available input modalities."),
    c("3.1.1", "Language of Page", WcagLevel::A,
      "Check that the page declares its default human language via the lang attribute."),
    c("3.1.2", "Language of Parts", WcagLevel::Aa,
      "Check that passages in another language carry their own lang attribute."),
    c("3.1.3", "Unusual Words", WcagLevel::Aaa,
      "Check that definitions are available for idioms and jargon."),
    c("3.1.4", "Abbreviations", WcagLevel::Aaa,
      "Check that expanded forms of abbreviations are available."),
    c("3.1.5", "Reading Level", WcagLevel::Aaa,
      "Check that content beyond lower-secondary reading level has a simpler supplement."),
    c("3.1.6", "Pronunciation", WcagLevel::Aaa,
      "Check that pronunciation is available where meaning is ambiguous without it."),
    c("3.2.1", "On Focus", WcagLevel::A,
      "Check that receiving focus does not trigger a change of context."),
    c("3.2.2", "On Input", WcagLevel::A,
      "Check that changing a setting does not automatically change context without warning."),
    c("3.2.3", "Consistent Navigation", WcagLevel::Aa,
      "Check that repeated navigation occurs in the same relative order across pages."),
    c("3.2.4", "Consistent Identification", WcagLevel::Aa,
      "Check that components with the same function are identified consistently."),
    c("3.2.5", "Change on Request", WcagLevel::Aaa,
      "Check that context changes happen only on explicit user request."),
    c("3.3.1", "Error Identification", WcagLevel::A,
      "Check that input errors are identified and described to the user in text."),
    c("3.3.2", "Labels or Instructions", WcagLevel::A,
      "Check that inputs have labels or instructions."),
    c("3.3.3", "Error Suggestion", WcagLevel::Aa,
      "Check that known input errors come with correction suggestions."),
    c("3.3.4", "Error Prevention (Legal, Financial, Data)", WcagLevel::Aa,
      "Check that legal or financial submissions are reversible, checked, or confirmed."),
    c("3.3.5", "Help", WcagLevel::Aaa,
      "Check that context-sensitive help is available."),
    c("3.3.6", "Error Prevention (All)", WcagLevel::Aaa,
      "Check that all submissions are reversible, checked, or confirmed."),
    c("4.1.1", "Parsing", WcagLevel::A,
      "Check that markup has complete tags, properly nested elements, and unique ids."),
    c("4.1.2", "Name, Role, Value", WcagLevel::A,
      "Check that custom components expose name, role, states, and values to assistive tech."),
    c("4.1.3", "Status Messages", WcagLevel::Aa,
      "Check that status messages are announced without receiving focus (live regions)."),
];

/// Criteria applicable at a conformance level, sorted lexicographically by
/// id. A includes A; AA includes A and AA; AAA includes everything. The
/// lexicographic order is part of the partitioning contract — it must not
/// change between runs.
pub fn criteria_for_level(level: WcagLevel) -> Vec<&'static Criterion> {
    let mut selected: Vec<&'static Criterion> = CRITERIA
        .iter()
        .filter(|criterion| level.includes(criterion.level))
        .collect();
    selected.sort_by(|a, b| a.id.cmp(b.id));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_counts_match_wcag_21() {
        assert_eq!(criteria_for_level(WcagLevel::A).len(), 30);
        assert_eq!(criteria_for_level(WcagLevel::Aa).len(), 50);
        assert_eq!(criteria_for_level(WcagLevel::Aaa).len(), 78);
    }

    #[test]
    fn levels_are_cumulative() {
        let a: Vec<&str> = criteria_for_level(WcagLevel::A).iter().map(|c| c.id).collect();
        let aa: Vec<&str> = criteria_for_level(WcagLevel::Aa).iter().map(|c| c.id).collect();
        for id in &a {
            assert!(aa.contains(id), "{id} missing from AA set");
        }
    }

    #[test]
    fn order_is_lexicographic_and_stable() {
        let ids: Vec<&str> = criteria_for_level(WcagLevel::Aa).iter().map(|c| c.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        // Lexicographic, not numeric: 1.4.10 sorts before 1.4.2.
        let p10 = ids.iter().position(|id| *id == "1.4.10").unwrap();
        let p2 = ids.iter().position(|id| *id == "1.4.2").unwrap();
        assert!(p10 < p2);
    }

    #[test]
    fn ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for criterion in CRITERIA {
            assert!(seen.insert(criterion.id), "duplicate id {}", criterion.id);
        }
    }
}

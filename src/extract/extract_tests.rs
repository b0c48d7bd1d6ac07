// ─────────────────────────────── Tests ───────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::extract::incident_kind::{CasualtyTag, IncidentKind};
    use crate::extract::keywords::KeywordConfig;
    use crate::extract::*;
    use crate::gazetteer::{Gazetteer, RawPlace};
    use crate::llm::{ClassificationResult, LlmClassifier, OneOrMany};
    use crate::normalize::normalize;
    use crate::store::ThreatLevel;

    fn lebanon_classifier() -> KeywordClassifier {
        KeywordClassifier::new(KeywordConfig::default_lebanon())
    }

    fn gazetteer() -> Arc<Gazetteer> {
        let place = |name: &str, lon: f64, lat: f64| RawPlace {
            name: name.to_string(),
            coordinates: json!([lon, lat]),
        };
        Arc::new(Gazetteer::build([
            place("بيروت", 35.5018, 33.8938),
            place("صيدا", 35.3708, 33.5606),
            place("بيت", 35.0, 33.0),
            place("بيت مري", 35.6092, 33.8509),
        ]))
    }

    fn pipeline() -> ExtractionPipeline {
        ExtractionPipeline::new(
            gazetteer(),
            lebanon_classifier(),
            LlmClassifier::disabled(),
            PipelineConfig::default(),
        )
    }

    fn pipeline_with(config: PipelineConfig) -> ExtractionPipeline {
        ExtractionPipeline::new(gazetteer(), lebanon_classifier(), LlmClassifier::disabled(), config)
    }

    // ── Keyword classification ──

    #[test]
    fn detects_fire_ar() {
        let c = lebanon_classifier();
        let kinds = c.classify_incident(&normalize("حريق كبير في المنطقة"));
        assert_eq!(kinds, vec![IncidentKind::Fire]);
    }

    #[test]
    fn detects_fire_en() {
        let c = lebanon_classifier();
        let kinds = c.classify_incident(&normalize("Large FIRE near the port"));
        assert_eq!(kinds, vec![IncidentKind::Fire]);
    }

    #[test]
    fn detects_multiple_kinds() {
        let c = lebanon_classifier();
        let kinds = c.classify_incident(&normalize("حريق في المبنى ونقل الجرحى إلى المستشفى"));
        assert!(kinds.contains(&IncidentKind::Fire));
        assert!(kinds.contains(&IncidentKind::Medical));
        assert_eq!(kinds.len(), 2);
    }

    #[test]
    fn matches_despite_diacritics_and_letter_forms() {
        let c = lebanon_classifier();
        // Diacritized "إطلاق نار" with hamza-alef must still match.
        let kinds = c.classify_incident(&normalize("إِطْلاق نَار في الشارع"));
        assert_eq!(kinds, vec![IncidentKind::Shooting]);
    }

    #[test]
    fn no_keywords_no_kinds() {
        let c = lebanon_classifier();
        assert!(c.classify_incident(&normalize("صباح الخير يا لبنان")).is_empty());
    }

    #[test]
    fn detects_casualty_tags() {
        let c = lebanon_classifier();
        let tags = c.classify_casualties(&normalize("سقوط قتيل وثلاثة جرحى"));
        assert!(tags.contains(&CasualtyTag::Killed));
        assert!(tags.contains(&CasualtyTag::Injured));
        assert!(!tags.contains(&CasualtyTag::Missing));
    }

    #[test]
    fn detects_no_threat_phrase() {
        let c = lebanon_classifier();
        assert!(c.is_no_threat(&normalize("انفجار مضبوط، لا تهديد للسكان")));
        assert!(!c.is_no_threat(&normalize("انفجار كبير في المرفأ")));
    }

    #[test]
    fn fixture_keyword_sets_are_injectable() {
        // Tests run against fixture tables, independent of production lists.
        let classifier = KeywordClassifier::new(KeywordConfig {
            incident: vec![(IncidentKind::Flood, vec!["طوفان".into()])],
            casualty: vec![],
            no_threat: vec![],
        });
        assert_eq!(
            classifier.classify_incident(&normalize("طوفان في الوادي")),
            vec![IncidentKind::Flood]
        );
        assert!(classifier.classify_incident(&normalize("حريق كبير")).is_empty());
    }

    // ── Number extraction ──

    #[test]
    fn extracts_numbers_in_order() {
        assert_eq!(extract_numbers("سقط 3 جرحى و 12 مصابا", 6), vec!["3", "12"]);
    }

    #[test]
    fn folds_arabic_indic_digits() {
        assert_eq!(extract_numbers("١٢ قتيلا و ۴ جرحى", 6), vec!["12", "4"]);
    }

    #[test]
    fn drops_identifier_length_numbers() {
        let numbers = extract_numbers("اتصلوا على 0123456789 بعد سقوط 25 جريحا", 6);
        assert_eq!(numbers, vec!["25"]);
    }

    // ── Pipeline ──

    #[tokio::test]
    async fn end_to_end_fire_in_beirut() {
        let records = pipeline()
            .process("lebanon_news", 42, "2026-08-01T10:00:00+00:00", "حريق كبير في بيروت، 3 جرحى")
            .await;

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.incident_type, IncidentKind::Fire);
        assert_eq!(record.location, "بيروت");
        assert_eq!(record.coordinates, (35.5018, 33.8938));
        assert_eq!(record.channel, "lebanon_news");
        assert_eq!(record.message_id, 42);
        assert_eq!(record.threat_level, ThreatLevel::Yes);
        assert_eq!(record.details.numbers_found, vec!["3"]);
        assert_eq!(record.details.casualties, vec![CasualtyTag::Injured]);
        assert_eq!(record.details.summary, "حريق كبير في بيروت، 3 جرحى");
    }

    #[tokio::test]
    async fn two_kinds_two_records() {
        let records = pipeline()
            .process("feed", 1, "2026-08-01T10:00:00+00:00", "حريق في بيروت ونقل الجرحى إلى المستشفى")
            .await;

        assert_eq!(records.len(), 2);
        let kinds: Vec<_> = records.iter().map(|r| r.incident_type).collect();
        assert!(kinds.contains(&IncidentKind::Fire));
        assert!(kinds.contains(&IncidentKind::Medical));
        // Both carry the same resolved location and message identity.
        for record in &records {
            assert_eq!(record.location, "بيروت");
            assert_eq!(record.message_id, 1);
        }
    }

    #[tokio::test]
    async fn unknown_location_is_rejected() {
        let records = pipeline()
            .process("feed", 2, "2026-08-01T10:00:00+00:00", "حريق كبير في الضيعة")
            .await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn no_incident_type_is_rejected() {
        let records = pipeline()
            .process("feed", 3, "2026-08-01T10:00:00+00:00", "أمسية جميلة في بيروت")
            .await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn multi_token_place_beats_its_prefix() {
        let records = pipeline()
            .process("feed", 4, "2026-08-01T10:00:00+00:00", "انفجار في بيت مري هذا المساء")
            .await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].location, "بيت مري");
    }

    #[tokio::test]
    async fn no_threat_phrase_lowers_threat_level() {
        let records = pipeline()
            .process("feed", 5, "2026-08-01T10:00:00+00:00", "انفجار مضبوط في بيروت، لا تهديد")
            .await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].threat_level, ThreatLevel::No);
    }

    #[tokio::test]
    async fn summary_is_bounded_with_ellipsis() {
        let config = PipelineConfig {
            summary_max_chars: 10,
            ..PipelineConfig::default()
        };
        let records = pipeline_with(config)
            .process("feed", 6, "2026-08-01T10:00:00+00:00", "حريق كبير جدا في بيروت الليلة")
            .await;
        assert_eq!(records.len(), 1);
        let summary = &records[0].details.summary;
        assert_eq!(summary.chars().count(), 13);
        assert!(summary.ends_with("..."));
    }

    #[tokio::test]
    async fn same_message_twice_stores_one_record() {
        let path = std::env::temp_dir().join(format!(
            "incident_watch_test_pipeline_{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let mut store = crate::store::IncidentStore::load(path.to_str().unwrap()).unwrap();

        let p = pipeline();
        for _ in 0..2 {
            let records = p
                .process("feed", 9, "2026-08-01T10:00:00+00:00", "حريق كبير في بيروت، 3 جرحى")
                .await;
            for record in records {
                store.admit(record);
            }
        }
        assert_eq!(store.len(), 1);
        let _ = std::fs::remove_file(&path);
    }

    // ── External result validation ──

    fn empty_signals() -> (Vec<IncidentKind>, Option<crate::gazetteer::GazetteerEntry>, ThreatLevel) {
        (Vec::new(), None, ThreatLevel::Yes)
    }

    #[test]
    fn external_kind_must_be_in_closed_set() {
        let p = pipeline();
        let (mut kinds, mut place, mut threat) = empty_signals();
        let external = ClassificationResult {
            incident_type: Some(OneOrMany::One("alien_invasion".into())),
            ..Default::default()
        };
        p.merge_external(&normalize("نص ما"), external, &mut kinds, &mut place, &mut threat);
        assert!(kinds.is_empty());
    }

    #[test]
    fn external_kind_list_is_validated_per_item() {
        let p = pipeline();
        let (mut kinds, mut place, mut threat) = empty_signals();
        let external = ClassificationResult {
            incident_type: Some(OneOrMany::Many(vec!["fire".into(), "nonsense".into()])),
            ..Default::default()
        };
        p.merge_external(&normalize("نص ما"), external, &mut kinds, &mut place, &mut threat);
        assert_eq!(kinds, vec![IncidentKind::Fire]);
    }

    #[test]
    fn external_location_needs_gazetteer_and_literal_occurrence() {
        let p = pipeline();
        let text = normalize("حريق قرب بيروت");

        // In gazetteer and in the text: accepted.
        let (mut kinds, mut place, mut threat) = empty_signals();
        let external = ClassificationResult {
            location: Some("بيروت".into()),
            ..Default::default()
        };
        p.merge_external(&text, external, &mut kinds, &mut place, &mut threat);
        assert_eq!(place.as_ref().map(|e| e.canonical_name.as_str()), Some("بيروت"));

        // In gazetteer but NOT in the text: a plausible hallucination, discarded.
        let (mut kinds, mut place, mut threat) = empty_signals();
        let external = ClassificationResult {
            location: Some("صيدا".into()),
            ..Default::default()
        };
        p.merge_external(&text, external, &mut kinds, &mut place, &mut threat);
        assert!(place.is_none());

        // Not in gazetteer at all: discarded.
        let (mut kinds, mut place, mut threat) = empty_signals();
        let external = ClassificationResult {
            location: Some("Unknown / Outside Lebanon".into()),
            ..Default::default()
        };
        p.merge_external(&text, external, &mut kinds, &mut place, &mut threat);
        assert!(place.is_none());
    }

    #[test]
    fn literal_occurrence_check_is_a_policy_toggle() {
        let p = pipeline_with(PipelineConfig {
            strict_llm_location: false,
            ..PipelineConfig::default()
        });
        let (mut kinds, mut place, mut threat) = empty_signals();
        let external = ClassificationResult {
            location: Some("صيدا".into()),
            ..Default::default()
        };
        p.merge_external(&normalize("حريق قرب بيروت"), external, &mut kinds, &mut place, &mut threat);
        assert_eq!(place.as_ref().map(|e| e.canonical_name.as_str()), Some("صيدا"));
    }

    #[test]
    fn external_threat_level_validated_fail_open() {
        let p = pipeline();
        let text = normalize("نص ما");

        let (mut kinds, mut place, mut threat) = empty_signals();
        let external = ClassificationResult {
            threat_level: Some("no".into()),
            ..Default::default()
        };
        p.merge_external(&text, external, &mut kinds, &mut place, &mut threat);
        assert_eq!(threat, ThreatLevel::No);

        // Anything other than the exact values defaults to "yes".
        let (mut kinds, mut place, _) = empty_signals();
        let mut threat = ThreatLevel::No;
        let external = ClassificationResult {
            threat_level: Some("probably".into()),
            ..Default::default()
        };
        p.merge_external(&text, external, &mut kinds, &mut place, &mut threat);
        assert_eq!(threat, ThreatLevel::Yes);

        // Absent field keeps the local heuristic.
        let (mut kinds, mut place, _) = empty_signals();
        let mut threat = ThreatLevel::No;
        p.merge_external(&text, ClassificationResult::default(), &mut kinds, &mut place, &mut threat);
        assert_eq!(threat, ThreatLevel::No);
    }

    #[test]
    fn external_kinds_do_not_override_local_ones() {
        let p = pipeline();
        let mut kinds = vec![IncidentKind::Fire];
        let mut place = None;
        let mut threat = ThreatLevel::Yes;
        let external = ClassificationResult {
            incident_type: Some(OneOrMany::One("protest".into())),
            ..Default::default()
        };
        p.merge_external(&normalize("نص ما"), external, &mut kinds, &mut place, &mut threat);
        assert_eq!(kinds, vec![IncidentKind::Fire]);
    }
}

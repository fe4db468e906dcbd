//! Cross-codec round-trip suite: LSF, LSX and LSV package laws.

use larsave::formats::lsf;
use larsave::pak::{self, LsvReader, LsvWriter, PackOptions, PackageVersion};
use larsave::prelude::*;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

/// Small deterministic generator for "arbitrary" trees.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn range(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

/// A node exercising every attribute type with boundary values.
fn all_types_node() -> Node {
    let mut node = Node::new("AllTypes");
    node.set_attribute("nothing", AttrType::None, AttrValue::None);
    node.set_attribute("byte", AttrType::Byte, AttrValue::Byte(255));
    node.set_attribute("short", AttrType::Short, AttrValue::Short(i16::MIN));
    node.set_attribute("ushort", AttrType::UShort, AttrValue::UShort(u16::MAX));
    node.set_attribute("int", AttrType::Int, AttrValue::Int(i32::MIN));
    node.set_attribute("uint", AttrType::UInt, AttrValue::UInt(u32::MAX));
    node.set_attribute("float", AttrType::Float, AttrValue::Float(0.1));
    node.set_attribute("tiny", AttrType::Float, AttrValue::Float(-3.61999e-6));
    node.set_attribute("double", AttrType::Double, AttrValue::Double(1.5e300));
    node.set_attribute("ivec2", AttrType::IVec2, AttrValue::IVec(vec![i32::MIN, i32::MAX]));
    node.set_attribute("ivec3", AttrType::IVec3, AttrValue::IVec(vec![-1, 0, 1]));
    node.set_attribute("ivec4", AttrType::IVec4, AttrValue::IVec(vec![1, 2, 3, 4]));
    node.set_attribute("vec2", AttrType::Vec2, AttrValue::Vec(vec![0.5, -0.25]));
    node.set_attribute("vec3", AttrType::Vec3, AttrValue::Vec(vec![1.0, 2.0, 3.0]));
    node.set_attribute("vec4", AttrType::Vec4, AttrValue::Vec(vec![0.1, 0.2, 0.3, 0.4]));
    node.set_attribute("mat2", AttrType::Mat2, AttrValue::Vec(vec![1.0, 0.0, 0.0, 1.0]));
    node.set_attribute("mat3", AttrType::Mat3, AttrValue::Vec(vec![0.0; 9]));
    node.set_attribute("mat3x4", AttrType::Mat3x4, AttrValue::Vec(vec![0.5; 12]));
    node.set_attribute("mat4x3", AttrType::Mat4x3, AttrValue::Vec(vec![0.25; 12]));
    node.set_attribute("mat4", AttrType::Mat4, AttrValue::Vec(vec![2.0; 16]));
    node.set_attribute("flag", AttrType::Bool, AttrValue::Bool(true));
    node.set_attribute("unflag", AttrType::Bool, AttrValue::Bool(false));
    node.set_attribute(
        "string",
        AttrType::String,
        AttrValue::String("Tav's <quoted \"journey\"> & co".to_string()),
    );
    node.set_attribute(
        "path",
        AttrType::Path,
        AttrValue::String("Public/Game/GUI/icons.lsx".to_string()),
    );
    node.set_attribute(
        "fixed",
        AttrType::FixedString,
        AttrValue::String("ORIGIN_Astarion".to_string()),
    );
    node.set_attribute("ls", AttrType::LSString, AttrValue::String(String::new()));
    node.set_attribute("ws", AttrType::WString, AttrValue::String("wide".to_string()));
    node.set_attribute("lsw", AttrType::LSWString, AttrValue::String("再生".to_string()));
    node.set_attribute("ull", AttrType::ULongLong, AttrValue::ULongLong(u64::MAX));
    node.set_attribute(
        "blob",
        AttrType::ScratchBuffer,
        AttrValue::Blob("3q2+7w==".to_string()),
    );
    node.set_attribute("long", AttrType::Long, AttrValue::Long(i64::MIN));
    node.set_attribute("int8", AttrType::Int8, AttrValue::Int8(i8::MIN));
    node.set_attribute(
        "loca",
        AttrType::TranslatedString,
        AttrValue::TranslatedString(TranslatedString {
            value: "Hello".to_string(),
            handle: "h0abc1234".to_string(),
        }),
    );
    node.set_attribute(
        "uuid",
        AttrType::Uuid,
        AttrValue::Uuid("427baeec-054d-4354-8de5-2bd2f1861b9a".to_string()),
    );
    node.set_attribute("int64", AttrType::Int64, AttrValue::Long(i64::MAX));
    node.set_attribute(
        "format",
        AttrType::TranslatedFSString,
        AttrValue::TranslatedFsString(two_level_fs_string()),
    );
    node
}

fn two_level_fs_string() -> TranslatedFsString {
    let inner = TranslatedFsString {
        value: "{gold}".to_string(),
        handle: "hinner001".to_string(),
        arguments: vec![larsave::tree::FsStringArgument {
            key: "gold".to_string(),
            value: "250".to_string(),
            string: None,
        }],
    };
    TranslatedFsString {
        value: "You receive {reward}".to_string(),
        handle: "houter001".to_string(),
        arguments: vec![larsave::tree::FsStringArgument {
            key: "reward".to_string(),
            value: "the loot".to_string(),
            string: Some(Box::new(inner)),
        }],
    }
}

/// Generated tree: a region with nested children and shuffled scalar
/// attributes, optionally keyed (BG3 only).
fn generated_tree(seed: u64, with_keys: bool) -> Node {
    let mut rng = Lcg(seed);
    let mut region = Node::new("Story");
    region.set_attribute("Seed", AttrType::ULongLong, AttrValue::ULongLong(seed));

    let names = ["Characters", "Items", "Globals", "Triggers", "Journal"];
    for depth0 in 0..rng.range(4) + 2 {
        let mut child = Node::new(names[(depth0 % 5) as usize]);
        if with_keys && rng.range(2) == 0 {
            child.key = Some(format!("k{}", rng.next()));
        }
        for a in 0..rng.range(5) + 1 {
            match rng.range(4) {
                0 => child.set_attribute(
                    format!("i{a}"),
                    AttrType::Int,
                    AttrValue::Int(rng.next() as i32),
                ),
                1 => child.set_attribute(
                    format!("f{a}"),
                    AttrType::Float,
                    AttrValue::Float((rng.range(100000) as f32) / 128.0),
                ),
                2 => child.set_attribute(
                    format!("s{a}"),
                    AttrType::FixedString,
                    AttrValue::String(format!("value-{}", rng.next())),
                ),
                _ => child.set_attribute(
                    format!("b{a}"),
                    AttrType::Bool,
                    AttrValue::Bool(rng.range(2) == 0),
                ),
            }
        }
        for g in 0..rng.range(3) {
            let mut grandchild = Node::new("Entry");
            grandchild.set_attribute(
                "Index",
                AttrType::UInt,
                AttrValue::UInt((depth0 * 100 + g) as u32),
            );
            child.add_child(grandchild);
        }
        region.add_child(child);
    }
    region
}

// ---------------------------------------------------------------------------
// LSF round-trips
// ---------------------------------------------------------------------------

#[test]
fn lsf_round_trip_bg3() {
    let mut root = generated_tree(0xB63, true);
    root.add_child(all_types_node());
    let doc = Document::new(root, Version::new(4, 0, 9, 331));

    let bytes = serialize_lsf(&doc).unwrap();
    let read_back = parse_lsf_bytes(&bytes).unwrap();

    assert_eq!(read_back.version, doc.version);
    assert_eq!(read_back.root, doc.root);
}

#[test]
fn lsf_round_trip_dos2() {
    // No node keys: the v3 layout has no keys section to carry them.
    let mut root = generated_tree(77, false);
    root.add_child(all_types_node());
    let doc = Document::new(root, Version::new(3, 6, 4, 0));

    let bytes = serialize_lsf(&doc).unwrap();
    assert_eq!(&bytes[..4], b"LSOF");
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 3);

    let read_back = parse_lsf_bytes(&bytes).unwrap();
    assert_eq!(read_back.version, doc.version);
    assert_eq!(read_back.root, doc.root);
}

#[test]
fn lsf_rewrite_is_byte_identical() {
    let mut root = generated_tree(12345, true);
    root.add_child(all_types_node());
    let doc = Document::new(root, Version::new(4, 0, 9, 331));

    let first = serialize_lsf(&doc).unwrap();
    let second = serialize_lsf(&parse_lsf_bytes(&first).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn lsf_multi_region_gets_save_root() {
    let mut save = Node::new("save");
    save.add_child(generated_tree(1, false));
    let mut second = generated_tree(2, false);
    second.name = "Journal".to_string();
    save.add_child(second);
    let doc = Document::new(save, Version::new(4, 0, 9, 331));

    let read_back = parse_lsf_bytes(&serialize_lsf(&doc).unwrap()).unwrap();
    assert!(read_back.root.is_save_root());
    assert_eq!(read_back.root.children.len(), 2);
    assert_eq!(read_back.root, doc.root);
}

#[test]
fn lsf_round_trip_bg3_v5() {
    // Early BG3 files: 64-bit header but the compact 40-byte metadata
    // block and no keys section.
    let mut root = generated_tree(555, false);
    root.add_child(all_types_node());
    let doc = Document::new(root, Version::new(4, 0, 0, 47));

    let bytes = lsf::serialize_lsf_with_version(&doc, 5, None).unwrap();
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 5);

    let read_back = parse_lsf_bytes(&bytes).unwrap();
    assert_eq!(read_back.version, doc.version);
    assert_eq!(read_back.root, doc.root);
}

#[test]
fn lsf_metadata_format_override_round_trips() {
    // BG3 content forced onto the 12-byte V2 entries.
    let mut root = generated_tree(99, false);
    root.add_child(all_types_node());
    let doc = Document::new(root, Version::new(4, 0, 9, 331));

    let bytes =
        lsf::serialize_lsf_with_format(&doc, Some(lsf::MetadataFormat::V2)).unwrap();
    let read_back = parse_lsf_bytes(&bytes).unwrap();
    assert_eq!(read_back.root, doc.root);
}

#[test]
fn lsf_node_keys_survive() {
    let mut region = Node::new("Dictionary");
    region.set_attribute("Count", AttrType::Int, AttrValue::Int(1));
    let mut entry = Node::new("Entry");
    entry.key = Some("Gold".to_string());
    entry.set_attribute("Amount", AttrType::Int, AttrValue::Int(250));
    region.add_child(entry);
    let doc = Document::new(region, Version::new(4, 0, 9, 331));

    let read_back = parse_lsf_bytes(&serialize_lsf(&doc).unwrap()).unwrap();
    assert_eq!(read_back.root.children[0].key.as_deref(), Some("Gold"));
}

// ---------------------------------------------------------------------------
// LSX round-trips and formatting rules
// ---------------------------------------------------------------------------

#[test]
fn lsx_round_trip() {
    let mut root = generated_tree(4242, true);
    root.add_child(all_types_node());
    let doc = Document::new(root, Version::new(4, 0, 9, 331));

    let xml = serialize_lsx(&doc).unwrap();
    let read_back = parse_lsx(&xml).unwrap();
    assert_eq!(read_back.version, doc.version);
    assert_eq!(read_back.root, doc.root);
}

#[test]
fn lsx_rewrite_is_byte_identical() {
    let mut root = generated_tree(31337, false);
    root.add_child(all_types_node());
    let doc = Document::new(root, Version::new(4, 0, 9, 331));

    let first = serialize_lsx(&doc).unwrap();
    let second = serialize_lsx(&parse_lsx(&first).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn lsx_output_shape() {
    let mut region = Node::new("Config");
    region.set_attribute("Slot", AttrType::Int, AttrValue::Int(1));
    region.add_child(Node::new("Empty"));
    let doc = Document::new(region, Version::new(4, 0, 9, 331));

    let xml = serialize_lsx(&doc).unwrap();

    assert!(xml.starts_with('\u{feff}'), "missing BOM");
    assert!(xml.contains("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
    assert!(xml.contains("\r\n"), "line endings must be CRLF");
    assert!(!xml.replace("\r\n", "").contains('\n'), "stray bare newline");
    assert!(
        xml.contains("lslib_meta=\"v1,bswap_guids\""),
        "default lslib_meta missing"
    );
    // Empty nodes self-close with a space before the slash.
    assert!(xml.contains("<node id=\"Empty\" />"));
    assert!(xml.contains("<region id=\"Config\">"));
}

#[test]
fn lsx_float_boundary_tokens() {
    let mut region = Node::new("Floats");
    region.set_attribute("tiny", AttrType::Float, AttrValue::Float(-3.61999e-6));
    region.set_attribute("tenth", AttrType::Float, AttrValue::Float(0.1));
    let doc = Document::new(region, Version::new(4, 0, 9, 331));

    let xml = serialize_lsx(&doc).unwrap();
    assert!(xml.contains("value=\"-3.61999E-06\""), "got: {xml}");
    assert!(xml.contains("value=\"0.1\""));
}

#[test]
fn lsx_apostrophe_is_not_escaped() {
    let mut region = Node::new("Text");
    region.set_attribute(
        "speech",
        AttrType::LSString,
        AttrValue::String("it's \"fine\"".to_string()),
    );
    let doc = Document::new(region, Version::new(4, 0, 9, 331));

    let xml = serialize_lsx(&doc).unwrap();
    assert!(xml.contains("value=\"it's &quot;fine&quot;\""), "got: {xml}");
    assert!(!xml.contains("&apos;"));
}

#[test]
fn lsx_uuid_stays_canonical() {
    let mut region = Node::new("Ids");
    region.set_attribute(
        "uuid",
        AttrType::Uuid,
        AttrValue::Uuid("427baeec-054d-4354-8de5-2bd2f1861b9a".to_string()),
    );
    let doc = Document::new(region, Version::new(4, 0, 9, 331));

    let xml = serialize_lsx(&doc).unwrap();
    assert!(xml.contains("value=\"427baeec-054d-4354-8de5-2bd2f1861b9a\""));
}

#[test]
fn lsx_numeric_types_for_dos2() {
    let mut region = Node::new("Old");
    region.set_attribute("n", AttrType::FixedString, AttrValue::String("x".to_string()));
    let doc = Document::new(region, Version::new(3, 6, 4, 0));

    let xml = serialize_lsx(&doc).unwrap();
    assert!(xml.contains("type=\"22\""), "DOS2 output uses numeric ids: {xml}");

    let read_back = parse_lsx(&xml).unwrap();
    assert_eq!(read_back.root, doc.root);
}

#[test]
fn translated_fs_string_survives_lsf_lsx_lsf() {
    let mut region = Node::new("Loca");
    region.set_attribute(
        "format",
        AttrType::TranslatedFSString,
        AttrValue::TranslatedFsString(two_level_fs_string()),
    );
    let doc = Document::new(region, Version::new(4, 0, 9, 331));

    let lsf_first = serialize_lsf(&doc).unwrap();

    let xml = serialize_lsx(&parse_lsf_bytes(&lsf_first).unwrap()).unwrap();
    assert!(xml.contains("arguments=\"1\""), "inner argument count: {xml}");

    let lsf_second = serialize_lsf(&parse_lsx(&xml).unwrap()).unwrap();
    assert_eq!(lsf_first, lsf_second);
}

// ---------------------------------------------------------------------------
// LSV packages
// ---------------------------------------------------------------------------

fn sample_package(version: PackageVersion) -> Vec<u8> {
    let mut writer = LsvWriter::new(version).with_priority(20);
    writer.add_file(
        "globals.lsf",
        serialize_lsf(&Document::new(generated_tree(5, false), Version::new(3, 6, 4, 0)))
            .unwrap(),
        if version.is_bg3_layout() { 0x22 } else { 0x21 },
    );
    writer.add_file("meta.lsx", b"<save />".repeat(40), 0x22);
    writer.add_file("readme.txt", b"stored as-is".to_vec(), 0x00);
    writer.write().unwrap()
}

#[test]
fn package_round_trip_all_versions() {
    for version in [
        PackageVersion::V13,
        PackageVersion::V15,
        PackageVersion::V16,
        PackageVersion::V18,
    ] {
        let bytes = sample_package(version);
        let package = LsvReader::new(bytes).read().unwrap();

        assert_eq!(package.version, version);
        assert_eq!(package.files.len(), 3);
        assert_eq!(package.files[0].path, "globals.lsf");
        assert_eq!(package.files[2].data, b"stored as-is");
    }
}

#[test]
fn dos2_repack_is_byte_identical() {
    let original = sample_package(PackageVersion::V13);
    let package = LsvReader::new(original.clone()).read().unwrap();

    let mut writer = LsvWriter::new(package.version)
        .with_flags(package.flags)
        .with_priority(package.priority);
    for file in &package.files {
        writer.add_file(file.path.clone(), file.data.clone(), file.flags);
    }

    assert_eq!(writer.write().unwrap(), original);
}

#[test]
fn dos2_payloads_are_aligned_and_padded() {
    let bytes = sample_package(PackageVersion::V13);
    let mut reader = LsvReader::new(bytes.clone());
    reader.read_header().unwrap();
    let entries = reader.list_files().unwrap();

    assert!(entries.len() > 1);
    for pair in entries.windows(2) {
        let end_of_prev = (pair[0].offset + pair[0].size_on_disk) as usize;
        let next = pair[1].offset as usize;
        assert_eq!(next % 64, 0, "payload not 64-byte aligned");
        assert!(bytes[end_of_prev..next].iter().all(|&b| b == 0xAD));
    }
}

#[test]
fn bg3_package_has_start_header() {
    let bytes = sample_package(PackageVersion::V18);
    assert_eq!(&bytes[..4], b"LSPK");
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 18);
}

#[test]
fn dos2_package_has_tail_signature() {
    let bytes = sample_package(PackageVersion::V13);
    assert_ne!(&bytes[..4], b"LSPK");
    assert_eq!(&bytes[bytes.len() - 4..], b"LSPK");
}

#[test]
fn crc_is_recorded_for_dos2() {
    let bytes = sample_package(PackageVersion::V13);
    let mut reader = LsvReader::new(bytes);
    reader.read_header().unwrap();
    let entries = reader.list_files().unwrap();
    assert!(entries.iter().all(|e| e.crc != 0));
}

// ---------------------------------------------------------------------------
// Directory-level operations
// ---------------------------------------------------------------------------

#[test]
fn unpack_pack_cycle_preserves_bytes() {
    let dir = tempdir().unwrap();
    let pak_path = dir.path().join("original.lsv");
    let out_dir = dir.path().join("unpacked");
    let repacked = dir.path().join("repacked.lsv");

    let original = sample_package(PackageVersion::V13);
    std::fs::write(&pak_path, &original).unwrap();

    let extracted = pak::unpack(&pak_path, &out_dir).unwrap();
    assert_eq!(extracted.len(), 3);
    assert!(out_dir.join("__manifest__.json").exists());

    pak::pack(&out_dir, &repacked, &PackOptions::default()).unwrap();
    assert_eq!(std::fs::read(&repacked).unwrap(), original);
}

#[test]
fn extract_lsx_then_pack_lsx_round_trips_documents() {
    let dir = tempdir().unwrap();
    let pak_path = dir.path().join("save.lsv");
    let out_dir = dir.path().join("unpacked");
    let repacked = dir.path().join("repacked.lsv");

    let doc = Document::new(generated_tree(11, true), Version::new(4, 0, 9, 331));
    let mut writer = LsvWriter::new(PackageVersion::V18);
    writer.add_file("story/globals.lsf", serialize_lsf(&doc).unwrap(), 0x22);
    std::fs::write(&pak_path, writer.write().unwrap()).unwrap();

    let extracted = pak::extract_lsx(&pak_path, &out_dir).unwrap();
    assert!(extracted[0].to_string_lossy().ends_with("globals.lsx"));
    assert!(!out_dir.join("story/globals.lsf").exists());

    pak::pack_lsx(&out_dir, &repacked, &PackOptions::default()).unwrap();

    let package = LsvReader::from_file(&repacked).unwrap().read().unwrap();
    assert_eq!(package.files[0].path, "story/globals.lsf");
    let read_back = parse_lsf_bytes(&package.files[0].data).unwrap();
    assert_eq!(read_back.root, doc.root);
}

#[test]
fn convert_dispatches_on_extension() {
    let dir = tempdir().unwrap();
    let lsf_path = dir.path().join("meta.lsf");
    let lsx_path = dir.path().join("meta.lsx");
    let lsf_again = dir.path().join("meta2.lsf");

    let doc = Document::new(generated_tree(8, false), Version::new(4, 0, 9, 331));
    write_lsf(&doc, &lsf_path).unwrap();

    converter::convert(&lsf_path, &lsx_path).unwrap();
    converter::convert(&lsx_path, &lsf_again).unwrap();

    let read_back = read_lsf(&lsf_again).unwrap();
    assert_eq!(read_back.root, doc.root);

    let err = converter::convert(dir.path().join("notes.txt"), dir.path().join("out.lsf"));
    assert!(err.is_err());
}

//! End-to-end verifier run over a synthetic input: a tiny reference, an indexed BAM with one
//! read group, and a two-individual VCF panel.

use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use bamid::panel::Panel;
use bamid::reference::Genome;
use bamid::verify::{grid_values, write_reports, BamInput, Verifier, VerifyOptions};
use bamid_sam::header::Header;
use bamid_sam::record::data::Value;
use bamid_sam::record::{QualityScores, Record, Sequence};
use bstr::BString;

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bamid_verify_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

// One 200-base sequence of alternating ACGT; base at 0-based position 100 is 'A'.
fn write_reference(dir: &PathBuf) -> PathBuf {
    let fasta_path = dir.join("ref.fa");

    let sequence: String = (0..200)
        .map(|i| ['A', 'C', 'G', 'T'][i % 4])
        .collect();

    fs::write(&fasta_path, format!(">1\n{}\n", sequence)).unwrap();
    fs::write(dir.join("ref.fa.fai"), "1\t200\t3\t200\t201\n").unwrap();

    fasta_path
}

fn write_panel(dir: &PathBuf) -> PathBuf {
    let vcf_path = dir.join("panel.vcf");

    // Individual A is homozygous reference at the site; individual B is homozygous
    // alternate.
    fs::write(
        &vcf_path,
        "##fileformat=VCFv4.1\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tA\tB\n\
1\t101\trs1\tA\tG\t100\tPASS\t.\tGT\t0/0\t1/1\n",
    )
    .unwrap();

    vcf_path
}

fn write_alignments(dir: &PathBuf) -> PathBuf {
    let bam_path = dir.join("sample.bam");

    let mut header: Header = "@HD\tVN:1.3\tSO:coordinate\n\
@SQ\tSN:1\tLN:200\n\
@RG\tID:rg0\tSM:A\n"
        .parse()
        .unwrap();
    header.generate_reference_info().unwrap();

    {
        let mut writer = bamid_bam::Writer::new(fs::File::create(&bam_path).unwrap());
        writer.write_header(&header).unwrap();

        // Six reads covering 0-based position 100 with the reference base.
        for i in 0..6 {
            let mut record = Record::new();
            record.set_read_name(BString::from(format!("read{}", i)));
            record.set_reference_sequence_id(0);
            record.set_position(96);
            record.set_mapping_quality(60);
            record.set_cigar("10M".parse().unwrap());
            // Matches the reference from 96: TACGTACGTA with 'A' at query index 4.
            record.set_sequence(Sequence::from_bases(b"TACGTACGTA".to_vec()));
            record.set_quality_scores(QualityScores::from_scores(vec![30; 10]));
            record
                .data_mut()
                .push(*b"RG", Value::String(BString::from("rg0")));

            writer.write_record(&mut record, None).unwrap();
        }

        writer.try_finish().unwrap();
    }

    // Index: every record in one chunk of bin 4681, linear index window 0.
    let buf = fs::read(&bam_path).unwrap();
    let mut raw = bamid_bam::Reader::new(Cursor::new(buf));
    raw.read_header().unwrap();

    let chunk_start = u64::from(raw.virtual_position());
    let mut record = Record::new();
    while raw.read_record(&mut record).unwrap() != 0 {}
    let chunk_end = u64::from(raw.virtual_position());

    let mut bai = Vec::new();
    bai.extend_from_slice(b"BAI\x01");
    bai.extend_from_slice(&1i32.to_le_bytes()); // n_ref
    bai.extend_from_slice(&1i32.to_le_bytes()); // n_bin
    bai.extend_from_slice(&4681u32.to_le_bytes());
    bai.extend_from_slice(&1i32.to_le_bytes()); // n_chunk
    bai.extend_from_slice(&chunk_start.to_le_bytes());
    bai.extend_from_slice(&chunk_end.to_le_bytes());
    bai.extend_from_slice(&1i32.to_le_bytes()); // n_intv
    bai.extend_from_slice(&chunk_start.to_le_bytes());

    fs::write(dir.join("sample.bam.bai"), bai).unwrap();

    bam_path
}

#[test]
fn test_verifier_identifies_the_matching_individual() {
    let dir = temp_dir();

    let fasta_path = write_reference(&dir);
    let vcf_path = write_panel(&dir);
    let bam_path = write_alignments(&dir);

    let genome = Genome::open(&fasta_path).unwrap();
    let mut panel = Panel::open_vcf(&vcf_path).unwrap();

    let options = VerifyOptions {
        min_af: 0.1,
        ibd_values: grid_values(0.5, 1.0),
        mix_values: grid_values(0.25, 0.5),
        hom_values: grid_values(0.5, 1.0),
        ..VerifyOptions::default()
    };

    let verifier = Verifier::new(options);
    let input = BamInput::Single {
        path: bam_path,
        index: None,
    };

    let summary = verifier.run(&input, &mut panel, &genome).unwrap();
    assert!(summary.same_sample());

    let prefix = dir.join("out");
    let prefix = prefix.to_str().unwrap();
    write_reports(prefix, &summary).unwrap();

    let best_rg = fs::read_to_string(format!("{}.bestRG", prefix)).unwrap();
    let lines: Vec<&str> = best_rg.lines().collect();
    assert_eq!(lines.len(), 2);

    let columns: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(columns[0], "A"); // SEQ_SM
    assert_eq!(columns[1], "rg0"); // RG
    assert_eq!(columns[2], "A"); // BEST_SM: the matching individual wins
    assert_eq!(columns[3], "1.000"); // BESTIBD
    assert_eq!(columns[6], "1"); // #GENOS
    assert_eq!(columns[7], "6"); // #BASES

    let self_sm = fs::read_to_string(format!("{}.selfSM", prefix)).unwrap();
    let lines: Vec<&str> = self_sm.lines().collect();
    assert_eq!(lines.len(), 2);

    let columns: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(columns[0], "A");
    assert_eq!(columns[1], "N/A");
    assert_eq!(columns[2], "A"); // SELF_SM
    assert_eq!(columns[3], "1.000"); // SELFIBD

    // With clean single-sample data the mixture scan should land on no contamination.
    let mix = columns[24];
    assert_eq!(mix, "0.000");

    fs::remove_dir_all(&dir).ok();
}

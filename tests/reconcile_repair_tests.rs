//! End-to-end reconciliation and repair over in-memory documents:
//! diagnose against a synthesized alternative, apply the generated edits,
//! and verify the repaired file no longer diagnoses.

use refit::diagnostics::codes;
use refit::dockerfile::{Distro, Dockerfile};
use refit::document::{self, Document};
use refit::features::Features;
use refit::language::profile_for_extension;
use refit::reconcile;
use refit::repair::{self, RepairContext};

fn generic_profile() -> refit::language::LanguageProfile {
    profile_for_extension("none", std::path::Path::new("."))
}

fn repair_all(
    text: &str,
    diagnostics: &[refit::diagnostics::RepairDiagnostic],
    alternative: Option<&str>,
) -> String {
    let document = Document::new(text.to_string());
    let context = RepairContext { alternative };
    let edits: Vec<_> = diagnostics
        .iter()
        .filter_map(|d| repair::generate(d, &document, &context))
        .collect();
    document::apply_edits(&document, &edits)
}

#[test]
fn test_missing_port_diagnosed_and_repaired() {
    let original_text = "FROM python:3.11-slim\nWORKDIR /app\nUSER app\nCOPY a b\nCOPY . .\nCMD python app.py\n";
    let original = Dockerfile::parse(original_text);

    let features = Features {
        ports: vec![5000],
        packages: Vec::new(),
    };
    let alternative = refit::synthesize::synthesize(original_text, &features, &generic_profile());
    let diagnostics = reconcile::reconcile(&original, alternative.dockerfile());

    let ports: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.code == codes::HERMIT_PORTS)
        .collect();
    assert_eq!(ports.len(), 1);
    assert!(ports[0].message.contains("5000"));

    let repaired = repair_all(original_text, &diagnostics, Some(alternative.text()));
    assert!(repaired.contains("EXPOSE 5000"));

    // The repaired file reconciles clean: re-synthesis inserts nothing new.
    let repaired_alt =
        refit::synthesize::synthesize(&repaired, &features, &generic_profile());
    let second_pass = reconcile::reconcile(
        &Dockerfile::parse(&repaired),
        repaired_alt.dockerfile(),
    );
    assert!(second_pass.iter().all(|d| d.code != codes::HERMIT_PORTS));
}

#[test]
fn test_missing_dependencies_diagnosed_and_repaired() {
    let original_text = "FROM python:3.11-slim\nWORKDIR /app\nUSER app\nCOPY a b\nCOPY . .\nCMD python app.py\n";
    let original = Dockerfile::parse(original_text);

    let features = Features {
        ports: Vec::new(),
        packages: vec!["curl".to_string(), "ffmpeg".to_string()],
    };
    let alternative = refit::synthesize::synthesize(original_text, &features, &generic_profile());
    let diagnostics = reconcile::reconcile(&original, alternative.dockerfile());

    let deps: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.code == codes::HERMIT_DEPS)
        .collect();
    assert_eq!(deps.len(), 1);
    assert!(deps[0].message.contains("curl,ffmpeg"));

    let repaired = repair_all(original_text, &diagnostics, Some(alternative.text()));
    assert!(repaired.contains("RUN apt-get update && apt-get install -y curl ffmpeg"));

    let repaired_alt =
        refit::synthesize::synthesize(&repaired, &features, &generic_profile());
    let second_pass = reconcile::reconcile(
        &Dockerfile::parse(&repaired),
        repaired_alt.dockerfile(),
    );
    assert!(second_pass.iter().all(|d| d.code != codes::HERMIT_DEPS));
}

#[test]
fn test_missing_dependencies_repaired_with_apk_on_alpine() {
    let original_text = "FROM python:3.11-alpine\nWORKDIR /app\nUSER app\nCOPY a b\nCOPY . .\nCMD python app.py\n";
    let original = Dockerfile::parse(original_text);

    let features = Features {
        ports: Vec::new(),
        packages: vec!["ffmpeg".to_string()],
    };
    let alternative = refit::synthesize::synthesize(original_text, &features, &generic_profile());
    let diagnostics = reconcile::reconcile(&original, alternative.dockerfile());

    let deps: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.code == codes::HERMIT_DEPS)
        .collect();
    assert_eq!(deps.len(), 1);
    assert!(deps[0].message.contains("ffmpeg"));

    // The inserted install step uses the image's own package manager.
    let repaired = repair_all(original_text, &diagnostics, Some(alternative.text()));
    assert!(repaired.contains("RUN apk add --no-cache ffmpeg"));
    assert!(!repaired.contains("apt-get"));

    let repaired_alt = refit::synthesize::synthesize(&repaired, &features, &generic_profile());
    let second_pass = reconcile::reconcile(
        &Dockerfile::parse(&repaired),
        repaired_alt.dockerfile(),
    );
    assert!(second_pass.iter().all(|d| d.code != codes::HERMIT_DEPS));
}

#[test]
fn test_dependency_tokenizer_reads_install_args() {
    let parsed =
        Dockerfile::parse("FROM debian\nRUN apt-get update && apt-get install -y curl vim\n");
    let runs = parsed.run_instructions_with_arg("apt-get");
    let packages = reconcile::gather_from_instructions(&runs, Distro::Debian);
    assert_eq!(packages, vec!["curl", "vim"]);
}

#[test]
fn test_dependency_tokenizer_stops_at_chained_command() {
    let args = [
        "apt-get", "install", "-y", "curl", "&&", "rm", "-rf", "/var/lib/apt/lists/*",
    ];
    let arg_refs: Vec<&str> = args.to_vec();
    assert_eq!(
        reconcile::gather_packages(&arg_refs, Distro::Debian),
        vec!["curl"]
    );
}

#[test]
fn test_declared_tool_suppresses_unnecessary_report() {
    // ffmpeg is invoked by a RUN step, so its absence from the alternative
    // is not reported as an unnecessary dependency.
    let original_text = "FROM debian:12\nWORKDIR /app\nUSER app\nRUN apt-get update && apt-get install -y ffmpeg\nCOPY a b\nCOPY . .\nRUN ffmpeg -i in.mp4 out.webm\nCMD ./serve\n";
    let original = Dockerfile::parse(original_text);

    let alternative = refit::synthesize::synthesize(
        "FROM debian:12\nWORKDIR /app\nUSER app\nCOPY a b\nCOPY . .\nCMD ./serve\n",
        &Features::default(),
        &generic_profile(),
    );
    let diagnostics = reconcile::reconcile(&original, alternative.dockerfile());
    assert!(diagnostics.iter().all(|d| d.code != codes::HERMIT_DEPS));
}

#[test]
fn test_root_user_cascade_adds_user_and_chown() {
    let original_text = "FROM node:18-slim\nWORKDIR /app\nCOPY package.json .\nCOPY . .\nCMD node app.js\n";
    let parsed = Dockerfile::parse(original_text);
    let diagnostics = refit::rules::check(&parsed);
    assert!(diagnostics.iter().any(|d| d.code == codes::NO_ROOT_USER));

    let repaired = repair_all(original_text, &diagnostics, None);
    assert!(repaired.contains("USER node"));
    // The last COPY is rewritten to hand ownership to the service user.
    assert!(repaired.contains("COPY --chown=node:node . ."));
}

#[test]
fn test_single_copy_split_preserves_manifest_layer() {
    let original_text =
        "FROM node:18-slim\nWORKDIR /app\nUSER node\nCOPY . .\nRUN npm install\nCMD node app.js\n";
    let parsed = Dockerfile::parse(original_text);
    let diagnostics = refit::rules::check(&parsed);
    assert!(diagnostics.iter().any(|d| d.code == codes::SINGLE_COPY));

    let repaired = repair_all(original_text, &diagnostics, None);
    assert!(repaired.contains("COPY package*.json ./"));
    assert!(repaired.contains("RUN npm install"));
    // The source copy moves below the install step and takes the declared
    // user's ownership.
    assert!(repaired.contains("COPY --chown=node:node . ."));
}

#[test]
fn test_batch_repairs_with_nested_ranges_stay_well_formed() {
    // The copy-split span contains the user repair's insertion anchor; a
    // single batch applies a non-overlapping subset and the next cycle
    // finishes the job.
    let original_text = "FROM node:18-slim\nCOPY . .\nRUN npm install\nCMD node app.js\n";
    let parsed = Dockerfile::parse(original_text);
    let diagnostics = refit::rules::check(&parsed);
    assert!(diagnostics.iter().any(|d| d.code == codes::SINGLE_COPY));
    assert!(diagnostics.iter().any(|d| d.code == codes::NO_ROOT_USER));

    let repaired = repair_all(original_text, &diagnostics, None);
    assert!(repaired.contains("WORKDIR /app"));
    assert!(repaired.contains("RUN npm install"));
    // No command line got severed from its RUN keyword.
    assert!(repaired
        .lines()
        .all(|line| !line.trim_start().starts_with("npm")));

    let second = refit::rules::check(&Dockerfile::parse(&repaired));
    let repaired_again = repair_all(&repaired, &second, None);
    assert!(repaired_again.contains("USER node"));
    assert!(repaired_again.contains("COPY --chown=node:node . ."));
}

#[test]
fn test_static_repairs_converge() {
    // Repairing the repaired file changes nothing further for the simple
    // text rules.
    let original_text =
        "FROM debian:12\nWORKDIR /app\nUSER app\nRUN curl http://example.com/x.sh\nCMD ./x.sh\n";
    let parsed = Dockerfile::parse(original_text);
    let diagnostics = refit::rules::check(&parsed);
    let repaired = repair_all(original_text, &diagnostics, None);
    assert!(repaired.contains("curl -f"));
    assert!(repaired.contains("https://example.com/x.sh"));

    let second = refit::rules::check(&Dockerfile::parse(&repaired));
    assert!(second.iter().all(|d| d.code != codes::F_CURL));
    assert!(second.iter().all(|d| d.code != codes::NO_HTTP_URL));
}

#[test]
fn test_crlf_document_repairs_keep_crlf() {
    let original_text = "FROM debian:12\r\nUSER app\r\nRUN ./build.sh\r\nCMD ./app\r\n";
    let parsed = Dockerfile::parse(original_text);
    let diagnostics = refit::rules::check(&parsed);
    assert!(diagnostics.iter().any(|d| d.code == codes::NO_ROOT_DIR));

    let repaired = repair_all(original_text, &diagnostics, None);
    assert!(repaired.contains("WORKDIR /app\r\n"));
    assert!(!repaired.replace("\r\n", "").contains('\r'));
}

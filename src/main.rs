use std::env;
use std::fs::File;
use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context as _;
use gocurl::{printer, RequestOptions};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default()).init();
    log::debug!("gocurl {}", env!("CARGO_PKG_VERSION"));

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("gocurl: no URL specified");
        eprintln!("usage: gocurl [options...] <url>");
        return ExitCode::from(1);
    }

    let options = match gocurl::parse_args(args) {
        Ok(options) => options,
        Err(err) => {
            let err = err.into();
            report(&err);
            return exit_code(&err);
        }
    };
    log::debug!("{options:#?}");

    match run(&options) {
        Ok(code) => code,
        Err(err) => {
            if !options.silent {
                report(&err);
            }
            exit_code(&err)
        }
    }
}

fn run(options: &RequestOptions) -> anyhow::Result<ExitCode> {
    gocurl::validate_strict(options)?;

    let prepared = gocurl::prepare(options)?;
    if options.verbose && !options.silent {
        let stderr = io::stderr();
        let _ = printer::print_request(&prepared.request, options.http2, &mut stderr.lock());
    }

    let response = prepared.send(options)?;

    if options.verbose && !options.silent {
        let stderr = io::stderr();
        let _ = printer::print_response_headers(&response, &mut stderr.lock());
    }

    let mut out: Box<dyn Write> = match &options.output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };

    if options.include_headers {
        printer::write_head(&response, &mut out).context("failed to write response head")?;
    }
    response.copy_to(&mut out)?;
    out.flush().context("failed to flush output")?;

    // Any delivered response is success; bad statuses only matter with -f,
    // which surfaces them as errors before we get here.
    Ok(ExitCode::SUCCESS)
}

fn report(err: &anyhow::Error) {
    eprintln!("gocurl: error: {err}");
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    use gocurl::Error;

    let Some(err) = err.downcast_ref::<Error>() else {
        // Local I/O around the response (output file, flush).
        return ExitCode::from(2);
    };
    match err {
        Error::Syntax { .. }
        | Error::UnknownVariable(..)
        | Error::UnknownFlag(..)
        | Error::AmbiguousUrl(..)
        | Error::ConflictingBody => ExitCode::from(1),
        Error::Validation { .. } | Error::File { .. } => ExitCode::from(2),
        Error::Transport(..) | Error::Context { .. } | Error::Http(..) => ExitCode::from(3),
        Error::BodyTooLarge { .. } => ExitCode::from(4),
    }
}

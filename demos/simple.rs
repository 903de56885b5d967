use std::rc::Rc;
use std::time::SystemTime;

use arbor::*;
use tracing_subscriber::EnvFilter;

// Define regular traits and implementor structs

trait Logger {
    fn log(&self, content: &str);
}

trait DateLogger {
    fn log_date(&self);
}

#[derive(Default)]
struct LoggerImpl;

impl Logger for LoggerImpl {
    fn log(&self, content: &str) {
        println!("{}", content);
    }
}

struct PrefixLogger {
    prefix: Rc<String>,
}

impl PrefixLogger {
    fn new(prefix: Rc<String>) -> Self {
        Self { prefix }
    }
}

impl Logger for PrefixLogger {
    fn log(&self, content: &str) {
        println!("[{}] {}", self.prefix, content);
    }
}

struct DateLoggerImpl {
    logger: Rc<dyn Logger>,
}

impl DateLoggerImpl {
    fn new(logger: Rc<dyn Logger>) -> Self {
        Self { logger }
    }
}

impl DateLogger for DateLoggerImpl {
    fn log_date(&self) {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.logger.log(&format!("{}s since epoch", secs));
    }
}

impl Dispose for DateLoggerImpl {
    fn dispose(&self) {
        self.logger.log("date logger disposed");
    }
}

// Declare how each implementor is constructed

constructible!(LoggerImpl);
constructible!(PrefixLogger, new, prefix: named::<String>("prefix"));
constructible!(dispose DateLoggerImpl, new, logger: dependency::<dyn Logger>());

fn main() -> Result<(), ResolveError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut builder = Builder::new();
    builder
        .register_type::<LoggerImpl>()
        .provides(|l: Rc<LoggerImpl>| -> Rc<dyn Logger> { l })
        .once();
    builder
        .register_type::<DateLoggerImpl>()
        .provides(|l: Rc<DateLoggerImpl>| -> Rc<dyn DateLogger> { l })
        .per_container();
    let container = builder.build()?;

    let b: Rc<dyn DateLogger> = container.get()?;
    b.log_date();

    // A request scope logging with a prefix
    let request = container.create_child(|builder| {
        builder.register().use_value(String::from("request")).as_key("prefix");
        builder
            .register_type::<PrefixLogger>()
            .provides(|l: Rc<PrefixLogger>| -> Rc<dyn Logger> { l });
    })?;
    let scoped: Rc<dyn DateLogger> = request.get()?;
    scoped.log_date();

    container.dispose();
    Ok(())
}

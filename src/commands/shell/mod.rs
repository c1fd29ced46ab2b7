pub mod files;
pub mod help;
pub mod navigation;

use super::{Command, CommandRegistryBuilder};
use crate::errors::SandboxError;

pub fn register(builder: &mut CommandRegistryBuilder) -> Result<(), SandboxError> {
    let table: [(&str, fn() -> Box<dyn Command>); 9] = [
        ("pwd", || Box::new(navigation::Pwd)),
        ("cd", || Box::new(navigation::Cd)),
        ("ls", || Box::new(navigation::Ls)),
        ("mkdir", || Box::new(files::Mkdir)),
        ("touch", || Box::new(files::Touch)),
        ("cat", || Box::new(files::Cat)),
        ("echo", || Box::new(files::Echo)),
        ("rm", || Box::new(files::Rm)),
        ("help", || Box::new(help::Help)),
    ];
    for (name, constructor) in table {
        builder.register(name, constructor)?;
    }
    Ok(())
}

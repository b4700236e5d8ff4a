use std::env;

use xbee_serial::api::ApiFrame;
use xbee_serial::device::parse_at_command;
use xbee_serial::hex;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() || args.len() > 2 {
        return Err("usage: at_frame <MNEMONIC> [HEX PARAMETER]".into());
    }

    let command = parse_at_command(&args[0])
        .map_err(|e| format!("could not parse AT command {}: {:?}", args[0], e))?;

    let mut parameter = [0; 256];
    let parameter_len = match args.get(1) {
        Some(p) => hex::decode(p.as_bytes(), &mut parameter[..])
            .map_err(|e| format!("could not decode parameter {}: {:?}", p, e))?,
        None => 0,
    };

    let frame = ApiFrame::at_command(1, command.mnemonic(), &parameter[..parameter_len])
        .map_err(|e| format!("could not build frame: {:?}", e))?;
    let bytes = frame
        .encode()
        .map_err(|e| format!("could not encode frame: {:?}", e))?;

    println!(
        "command {:?},\nframe {:?},\nbytes: {:02x?}",
        command, &frame, &bytes[..]
    );
    Ok(())
}
